//! Filesystem effect store
//!
//! Serves an effect directory straight from disk: manifest and asset
//! locations are plain file paths. Uploads are written into the directory and
//! the manifest is regenerated from the `.wav` files present.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{AmbienceError, Result};
use crate::playback::fetch::{AssetFetcher, EffectUploader, MANIFEST_FILE};

const EFFECT_EXTENSION: &str = "wav";

/// Effect directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalEffectStore {
    root: PathBuf,
}

impl LocalEffectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory string to pass to [`EffectLibrary::reload`](crate::playback::EffectLibrary::reload)
    pub fn directory(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// `.wav` files directly inside the store, sorted by name
    pub fn list_effects(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(EFFECT_EXTENSION))
                    .unwrap_or(false)
            })
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();

        names.sort();
        Ok(names)
    }

    /// Rewrite `index.json` from the files currently in the store
    ///
    /// # Returns
    /// The filenames written to the manifest
    pub fn write_manifest(&self) -> Result<Vec<String>> {
        let names = self.list_effects()?;
        let json = serde_json::to_string_pretty(&names)?;
        std::fs::write(self.root.join(MANIFEST_FILE), json)?;
        debug!(count = names.len(), root = %self.root.display(), "manifest written");
        Ok(names)
    }

    fn validate_filename(filename: &str) -> Result<()> {
        let rejected = |reason: &str| AmbienceError::UploadFailure {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };

        if filename.is_empty() || filename.starts_with('.') {
            return Err(rejected("filename must not be empty or hidden"));
        }
        if filename.contains(['/', '\\']) {
            return Err(rejected("filename must not contain path separators"));
        }
        let is_wav = Path::new(filename)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(EFFECT_EXTENSION))
            .unwrap_or(false);
        if !is_wav {
            return Err(rejected("only .wav files are accepted"));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetFetcher for LocalEffectStore {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        tokio::fs::read(location)
            .await
            .map_err(|e| AmbienceError::NetworkFailure {
                url: location.to_string(),
                reason: e.to_string(),
                source: Some(Box::new(e)),
            })
    }
}

#[async_trait]
impl EffectUploader for LocalEffectStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        Self::validate_filename(filename)?;

        let failed = |e: std::io::Error| AmbienceError::UploadFailure {
            filename: filename.to_string(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.root).await.map_err(failed)?;
        tokio::fs::write(self.root.join(filename), &bytes)
            .await
            .map_err(failed)?;

        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write_manifest())
            .await
            .map_err(|e| AmbienceError::UploadFailure {
                filename: filename.to_string(),
                reason: format!("manifest task failed: {}", e),
            })??;

        info!(filename, size = bytes.len(), "effect stored");
        Ok(())
    }
}
