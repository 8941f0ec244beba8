//! Effect directory collaborators
//!
//! The library only knows how to fetch bytes by location and how to hand an
//! uploaded file to storage. Locations follow the manifest protocol:
//! `{directory}/index.json` and `{directory}/{filename}`.

use async_trait::async_trait;

use crate::error::Result;

/// Name of the manifest file in every effect directory
pub const MANIFEST_FILE: &str = "index.json";

/// Fetches raw bytes for a manifest or asset location
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// # Errors
    /// `NetworkFailure` when the location cannot be read.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Accepts uploaded effect files into storage
#[async_trait]
pub trait EffectUploader: Send + Sync {
    /// # Errors
    /// `UploadFailure` when storage rejects the file.
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<()>;
}

/// Location of the manifest inside `directory`
pub fn manifest_location(directory: &str) -> String {
    asset_location(directory, MANIFEST_FILE)
}

/// Location of `filename` inside `directory`
pub fn asset_location(directory: &str, filename: &str) -> String {
    if directory.is_empty() {
        filename.to_string()
    } else {
        // "/" keeps its root: trimming leaves "" and the separator restores it
        format!("{}/{}", directory.trim_end_matches('/'), filename)
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use tracing::debug;

    use super::AssetFetcher;
    use crate::error::{AmbienceError, Result};

    /// Fetches effect directories served over HTTP
    #[derive(Debug, Clone)]
    pub struct HttpFetcher {
        client: reqwest::Client,
    }

    impl HttpFetcher {
        pub fn new(timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| AmbienceError::NetworkFailure {
                    url: String::new(),
                    reason: format!("failed to build HTTP client: {}", e),
                    source: Some(Box::new(e)),
                })?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl AssetFetcher for HttpFetcher {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
            debug!(url = location, "fetching");
            let failed = |e: reqwest::Error| AmbienceError::NetworkFailure {
                url: location.to_string(),
                reason: e.to_string(),
                source: Some(Box::new(e)),
            };

            let response = self
                .client
                .get(location)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(failed)?;
            let bytes = response.bytes().await.map_err(failed)?;
            Ok(bytes.to_vec())
        }
    }
}
