//! Session context
//!
//! One streaming session: the effect library, the gate-driven ambient loop,
//! the signal graph and the activity monitor, plus the optional upload and
//! remote settings collaborators. All caller-facing operations live here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::dsp::{ActivityGate, ActivityState, GainStage, GatePhase};
use crate::error::{AmbienceError, Result};
use crate::graph::{
    DeviceCapture, NoiseSuppressor, RoutingHandles, SignalGraphConfig, SignalGraphController,
};
use crate::playback::{AssetFetcher, EffectLibrary, EffectUploader, ReloadReport};
use crate::remote::{RemoteUploader, ServerConfigurator};
use crate::session::ambient::AmbientEffect;
use crate::session::monitor::ActivityMonitor;

/// A running voice session with its ambient effect
pub struct SessionContext {
    id: Uuid,
    created_at: DateTime<Utc>,
    settings: Mutex<EngineSettings>,
    library: Arc<EffectLibrary>,
    stage: GainStage,
    effect: Arc<Mutex<AmbientEffect>>,
    controller: SignalGraphController,
    monitor: ActivityMonitor,
    uploader: Option<Arc<dyn EffectUploader>>,
    remote: Option<Arc<dyn ServerConfigurator>>,
}

impl SessionContext {
    /// Create a session; nothing is fetched or captured yet
    ///
    /// # Errors
    /// `ConfigurationError` if `settings` fail validation.
    pub fn new(
        mut settings: EngineSettings,
        fetcher: Arc<dyn AssetFetcher>,
        capture: Arc<dyn DeviceCapture>,
    ) -> Result<Self> {
        settings.validate()?;

        let library = Arc::new(EffectLibrary::new(
            fetcher,
            Some(settings.graph.sample_rate),
        ));
        let stage = GainStage::default();
        let mut gate = ActivityGate::new(settings.sfx_gain, settings.sfx_threshold_db)?;
        gate.set_silence_budget_ms(settings.silence_budget_ms)?;
        let mut effect = AmbientEffect::new(gate, stage.clone(), library.clone());
        effect.select(settings.selected_effect);

        let controller = SignalGraphController::new(capture);
        controller.set_input_gain(settings.input_gain);
        controller.set_output_gain(settings.output_gain);
        controller.set_monitor_gain(settings.monitor_gain);

        let id = Uuid::new_v4();
        info!(session = %id, directory = %settings.sfx_directory, "session created");
        Ok(Self {
            id,
            created_at: Utc::now(),
            monitor: ActivityMonitor::new(settings.monitor_period()),
            settings: Mutex::new(settings),
            library,
            stage,
            effect: Arc::new(Mutex::new(effect)),
            controller,
            uploader: None,
            remote: None,
        })
    }

    /// Store uploaded effects through `uploader`
    pub fn with_uploader(mut self, uploader: Arc<dyn EffectUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Attach the server settings collaborator; its storage also becomes the
    /// upload target unless an uploader is already set
    pub fn with_remote(mut self, remote: Arc<dyn ServerConfigurator>) -> Self {
        if self.uploader.is_none() {
            self.uploader = Some(Arc::new(RemoteUploader::new(remote.clone())));
        }
        self.remote = Some(remote);
        self
    }

    pub fn with_suppressor(mut self, suppressor: Arc<dyn NoiseSuppressor>) -> Self {
        self.controller = self.controller.with_suppressor(suppressor);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings.lock().clone()
    }

    pub fn library(&self) -> &Arc<EffectLibrary> {
        &self.library
    }

    pub fn controller(&self) -> &SignalGraphController {
        &self.controller
    }

    /// Gain stage the ambient loop is mixed through
    pub fn stage(&self) -> &GainStage {
        &self.stage
    }

    pub fn activity(&self) -> ActivityState {
        *self.effect.lock().state()
    }

    pub fn phase(&self) -> GatePhase {
        self.effect.lock().phase()
    }

    pub fn is_playing(&self) -> bool {
        self.effect.lock().player().is_playing()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Handles for the live graph; `None` before the first rebuild or after
    /// a failed one
    pub fn routing(&self) -> Option<RoutingHandles> {
        self.controller.handles()
    }

    // ========================================================================
    // Effect controls
    // ========================================================================

    /// Set the effect gain (clamped to [0, 1])
    pub fn set_gain(&self, gain: f32) -> f32 {
        let applied = self.effect.lock().set_gain(gain);
        self.settings.lock().sfx_gain = applied;
        applied
    }

    /// Set the trigger threshold in dB
    pub fn set_threshold(&self, threshold_db: f32) -> Result<()> {
        self.effect.lock().set_threshold_db(threshold_db)?;
        self.settings.lock().sfx_threshold_db = threshold_db;
        Ok(())
    }

    pub fn set_silence_budget(&self, budget_ms: f64) -> Result<()> {
        self.effect.lock().set_silence_budget_ms(budget_ms)?;
        self.settings.lock().silence_budget_ms = budget_ms;
        Ok(())
    }

    /// Choose the library asset played on the next start
    pub fn select_effect(&self, index: usize) {
        self.effect.lock().select(index);
        self.settings.lock().selected_effect = index;
    }

    /// Start the effect now, ignoring levels
    pub fn start(&self) -> Result<()> {
        self.effect.lock().start()
    }

    /// Stop the effect now
    pub fn stop(&self) {
        self.effect.lock().stop();
    }

    pub fn set_input_gain(&self, gain: f32) -> f32 {
        let applied = self.controller.set_input_gain(gain);
        self.settings.lock().input_gain = applied;
        applied
    }

    pub fn set_output_gain(&self, gain: f32) -> f32 {
        let applied = self.controller.set_output_gain(gain);
        self.settings.lock().output_gain = applied;
        applied
    }

    pub fn set_monitor_gain(&self, gain: f32) -> f32 {
        let applied = self.controller.set_monitor_gain(gain);
        self.settings.lock().monitor_gain = applied;
        applied
    }

    // ========================================================================
    // Effect library
    // ========================================================================

    /// Reload the effect library from the configured directory
    pub async fn reload(&self) -> Result<ReloadReport> {
        let directory = self.settings.lock().sfx_directory.clone();
        self.library.reload(&directory).await
    }

    /// Store a new effect file and reload
    ///
    /// # Errors
    /// `UploadFailure` if no upload collaborator is configured or it rejects
    /// the file, otherwise any reload error.
    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<ReloadReport> {
        let uploader = self
            .uploader
            .clone()
            .ok_or_else(|| AmbienceError::UploadFailure {
                filename: filename.to_string(),
                reason: "no upload target configured".to_string(),
            })?;
        let directory = self.settings.lock().sfx_directory.clone();
        self.library
            .upload(uploader.as_ref(), bytes, filename, &directory)
            .await
    }

    // ========================================================================
    // Signal graph
    // ========================================================================

    /// Rebuild the signal graph for `config`
    pub async fn reconfigure(&self, config: SignalGraphConfig) -> Result<RoutingHandles> {
        self.settings.lock().graph = config.clone();
        self.controller.reconfigure(config).await
    }

    /// Apply a new settings document
    ///
    /// Gains, threshold, budget and selection change live. The signal graph
    /// is rebuilt only when an input-side field changed.
    ///
    /// # Returns
    /// true if the graph was rebuilt
    pub async fn update_settings(&self, mut next: EngineSettings) -> Result<bool> {
        next.validate()?;
        let current = self.settings();

        if next.sfx_gain != current.sfx_gain {
            self.set_gain(next.sfx_gain);
        }
        if next.sfx_threshold_db != current.sfx_threshold_db {
            self.set_threshold(next.sfx_threshold_db)?;
        }
        if next.silence_budget_ms != current.silence_budget_ms {
            self.set_silence_budget(next.silence_budget_ms)?;
        }
        if next.selected_effect != current.selected_effect {
            self.select_effect(next.selected_effect);
        }
        if next.input_gain != current.input_gain {
            self.set_input_gain(next.input_gain);
        }
        if next.output_gain != current.output_gain {
            self.set_output_gain(next.output_gain);
        }
        if next.monitor_gain != current.monitor_gain {
            self.set_monitor_gain(next.monitor_gain);
        }
        if next.monitor_period_ms != current.monitor_period_ms {
            warn!(
                period_ms = next.monitor_period_ms,
                "monitor period changes take effect in a new session"
            );
        }

        let rebuild = current.graph.requires_rebuild(&next.graph);
        let graph = next.graph.clone();
        {
            let mut settings = self.settings.lock();
            settings.sfx_directory = next.sfx_directory;
            settings.graph = next.graph;
        }
        if rebuild {
            self.reconfigure(graph).await?;
        }
        Ok(rebuild)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Build the graph if needed and start activity monitoring
    pub async fn start_session(&self) -> Result<()> {
        if self.controller.handles().is_none() {
            let config = self.settings.lock().graph.clone();
            self.reconfigure(config).await?;
        }
        self.monitor.start(
            self.effect.clone(),
            self.controller.input_tap().clone(),
            self.controller.output_tap().clone(),
        );
        info!(session = %self.id, "session started");
        Ok(())
    }

    /// Stop monitoring and silence the effect
    ///
    /// # Returns
    /// false if monitoring was not running
    pub fn stop_session(&self) -> bool {
        let stopped = self.monitor.stop();
        self.effect.lock().stop();
        if stopped {
            info!(session = %self.id, "session stopped");
        }
        stopped
    }

    /// Stop the session and release capture
    pub async fn shutdown(&self) {
        self.stop_session();
        self.controller.teardown().await;
        info!(session = %self.id, "session shut down");
    }

    /// Run one block through the taps and mix the effect into `converted`
    ///
    /// The converted block is metered before the effect is mixed in, so the
    /// effect never holds the gate open by itself.
    ///
    /// # Arguments
    /// * `captured` - Microphone block as captured
    /// * `converted` - Interleaved converted block, mixed in place
    /// * `channels` - Channel count of `converted`
    pub fn process_frames(&self, captured: &[f32], converted: &mut [f32], channels: usize) {
        self.controller.input_tap().push(captured);
        self.controller.output_tap().push(converted);
        self.effect.lock().render_into(converted, channels);
    }

    // ========================================================================
    // Remote settings
    // ========================================================================

    fn remote(&self) -> Result<&Arc<dyn ServerConfigurator>> {
        self.remote.as_ref().ok_or_else(|| AmbienceError::RemoteFailure {
            reason: "no remote server configured".to_string(),
        })
    }

    pub async fn remote_settings(&self) -> Result<serde_json::Value> {
        self.remote()?.get_settings().await
    }

    pub async fn update_remote_setting(&self, key: &str, value: &str) -> Result<serde_json::Value> {
        self.remote()?.update_settings(key, value).await
    }

    pub async fn remote_effects(&self) -> Result<Vec<String>> {
        self.remote()?.get_sfx_list().await
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("library", &self.library)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}
