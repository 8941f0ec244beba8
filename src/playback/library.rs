//! Effect library
//!
//! Holds the decoded effect assets in manifest order. A reload builds a
//! complete new list off to the side and swaps it in at the end, so readers
//! never observe a half-built library and a failed manifest leaves the
//! previous list in place. Individual assets that fail to fetch or decode are
//! skipped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{decode_wav, AudioAsset};
use crate::error::{AmbienceError, Result};
use crate::playback::fetch::{asset_location, manifest_location, AssetFetcher, EffectUploader};

/// Immutable view of the library at one point in time
pub type AssetList = Arc<Vec<Arc<AudioAsset>>>;

/// An asset the reload had to skip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetFailure {
    pub filename: String,
    pub code: &'static str,
    pub reason: String,
}

/// Outcome of a successful reload
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub directory: String,
    /// Filenames listed in the manifest
    pub requested: usize,
    /// Assets actually decoded and installed
    pub loaded: usize,
    pub failures: Vec<AssetFailure>,
    pub completed_at: DateTime<Utc>,
}

impl ReloadReport {
    pub fn is_complete(&self) -> bool {
        self.loaded == self.requested
    }
}

/// Ordered set of decoded effect assets
pub struct EffectLibrary {
    fetcher: Arc<dyn AssetFetcher>,
    /// Decode target rate; `None` keeps each file's own rate
    target_rate: Option<u32>,
    assets: RwLock<AssetList>,
    last_report: Mutex<Option<ReloadReport>>,
    /// Serializes reloads so a later call always installs last
    reload_gate: tokio::sync::Mutex<()>,
}

impl EffectLibrary {
    /// Create an empty library
    pub fn new(fetcher: Arc<dyn AssetFetcher>, target_rate: Option<u32>) -> Self {
        Self {
            fetcher,
            target_rate,
            assets: RwLock::new(Arc::new(Vec::new())),
            last_report: Mutex::new(None),
            reload_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the library with the effects listed in `{directory}/index.json`
    ///
    /// # Errors
    /// `NetworkFailure` if the manifest cannot be fetched or parsed. The
    /// previously loaded assets are kept in that case.
    pub async fn reload(&self, directory: &str) -> Result<ReloadReport> {
        let _gate = self.reload_gate.lock().await;

        let filenames = self.fetch_manifest(directory).await?;
        let mut assets = Vec::with_capacity(filenames.len());
        let mut failures = Vec::new();

        for filename in &filenames {
            match self.load_asset(directory, filename).await {
                Ok(asset) => assets.push(Arc::new(asset)),
                Err(e) => {
                    warn!(filename = %filename, error = %e, "skipping effect asset");
                    failures.push(AssetFailure {
                        filename: filename.clone(),
                        code: e.error_code(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = ReloadReport {
            directory: directory.to_string(),
            requested: filenames.len(),
            loaded: assets.len(),
            failures,
            completed_at: Utc::now(),
        };

        *self.assets.write() = Arc::new(assets);
        *self.last_report.lock() = Some(report.clone());
        info!(
            directory,
            loaded = report.loaded,
            requested = report.requested,
            "effect library reloaded"
        );
        Ok(report)
    }

    /// Hand a file to storage, then reload `directory`
    ///
    /// # Errors
    /// The uploader's error if storage rejects the file (no reload happens),
    /// otherwise any error from [`EffectLibrary::reload`].
    pub async fn upload(
        &self,
        uploader: &dyn EffectUploader,
        bytes: Vec<u8>,
        filename: &str,
        directory: &str,
    ) -> Result<ReloadReport> {
        uploader.upload(bytes, filename).await?;
        info!(filename, "effect uploaded");
        self.reload(directory).await
    }

    /// Current asset list
    pub fn snapshot(&self) -> AssetList {
        self.assets.read().clone()
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<AudioAsset>> {
        self.assets.read().get(index).cloned()
    }

    /// Asset to loop for a selection index, falling back to the first asset
    pub fn select(&self, index: usize) -> Option<Arc<AudioAsset>> {
        let assets = self.assets.read();
        assets.get(index).or_else(|| assets.first()).cloned()
    }

    /// Asset ids in library order
    pub fn ids(&self) -> Vec<String> {
        self.assets
            .read()
            .iter()
            .map(|a| a.id().to_string())
            .collect()
    }

    pub fn last_report(&self) -> Option<ReloadReport> {
        self.last_report.lock().clone()
    }

    async fn fetch_manifest(&self, directory: &str) -> Result<Vec<String>> {
        let location = manifest_location(directory);
        let bytes = self.fetcher.fetch(&location).await.map_err(|e| match e {
            e @ AmbienceError::NetworkFailure { .. } => e,
            other => AmbienceError::NetworkFailure {
                url: location.clone(),
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        })?;

        serde_json::from_slice::<Vec<String>>(&bytes).map_err(|e| AmbienceError::NetworkFailure {
            url: location.clone(),
            reason: format!("manifest is not a JSON array of filenames: {}", e),
            source: Some(Box::new(e)),
        })
    }

    async fn load_asset(&self, directory: &str, filename: &str) -> Result<AudioAsset> {
        let bytes = self.fetcher.fetch(&asset_location(directory, filename)).await?;
        let name = filename.to_string();
        let target_rate = self.target_rate;

        tokio::task::spawn_blocking(move || decode_wav(&name, &bytes, target_rate))
            .await
            .map_err(|e| AmbienceError::decode(filename, format!("decode task failed: {}", e)))?
    }
}

impl std::fmt::Debug for EffectLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectLibrary")
            .field("assets", &self.ids())
            .field("target_rate", &self.target_rate)
            .finish()
    }
}
