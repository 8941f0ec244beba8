//! Remote settings collaborator
//!
//! The conversion server exposes its own settings and effect storage. The
//! session only talks to it through [`ServerConfigurator`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::playback::EffectUploader;

/// Settings and effect storage on the conversion server
#[async_trait]
pub trait ServerConfigurator: Send + Sync {
    /// Full server settings document
    async fn get_settings(&self) -> Result<serde_json::Value>;

    /// Set one server setting; returns the updated settings document
    async fn update_settings(&self, key: &str, value: &str) -> Result<serde_json::Value>;

    /// Effect filenames stored on the server
    async fn get_sfx_list(&self) -> Result<Vec<String>>;

    async fn upload_sfx(&self, bytes: Vec<u8>, filename: &str) -> Result<()>;
}

/// Uses a server's effect storage as the upload collaborator
#[derive(Clone)]
pub struct RemoteUploader {
    server: Arc<dyn ServerConfigurator>,
}

impl RemoteUploader {
    pub fn new(server: Arc<dyn ServerConfigurator>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl EffectUploader for RemoteUploader {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        self.server.upload_sfx(bytes, filename).await
    }
}

impl std::fmt::Debug for RemoteUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteUploader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AmbienceError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeServer {
        files: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServerConfigurator for FakeServer {
        async fn get_settings(&self) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "sfxDir": "sfx" }))
        }

        async fn update_settings(&self, key: &str, _value: &str) -> Result<serde_json::Value> {
            Err(AmbienceError::RemoteFailure {
                reason: format!("unknown key {}", key),
            })
        }

        async fn get_sfx_list(&self) -> Result<Vec<String>> {
            Ok(self.files.lock().clone())
        }

        async fn upload_sfx(&self, _bytes: Vec<u8>, filename: &str) -> Result<()> {
            self.files.lock().push(filename.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_remote_uploader_forwards() {
        let server = Arc::new(FakeServer::default());
        let uploader = RemoteUploader::new(server.clone());
        uploader.upload(vec![1, 2, 3], "rain.wav").await.unwrap();
        assert_eq!(server.get_sfx_list().await.unwrap(), vec!["rain.wav"]);
    }
}
