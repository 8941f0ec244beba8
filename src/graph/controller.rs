//! Signal graph controller
//!
//! Rebuilds the voice path whenever the input configuration changes. Every
//! rebuild runs under the [`ReconfigureLock`], tears down the previous input
//! chain, acquires the new input and wires a fresh [`RoutingTable`] that is
//! swapped in whole at the end. A failed rebuild leaves the output side wired
//! with no input source.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dsp::{clamp_gain, LevelTap};
use crate::engine::DEFAULT_SAMPLE_RATE;
use crate::error::{AmbienceError, Result};
use crate::graph::lock::ReconfigureLock;
use crate::graph::routing::{NodeId, NodeKind, RoutingTable, TapSide};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Capture collaborators
// ============================================================================

/// Constraints passed to the device capture collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureConstraints {
    pub device_id: String,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

/// A live capture stream
///
/// Clones share the track state: stopping one stops them all.
#[derive(Debug, Clone)]
pub struct CaptureStream {
    id: u64,
    device_id: String,
    live: Arc<AtomicBool>,
}

impl CaptureStream {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            device_id: device_id.into(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Stop every track of the stream
    pub fn stop_tracks(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            debug!(stream = self.id, device = %self.device_id, "capture tracks stopped");
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl PartialEq for CaptureStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Opens capture streams on input devices
#[async_trait]
pub trait DeviceCapture: Send + Sync {
    /// # Errors
    /// `DeviceAcquisitionFailure` when the device is missing, busy or not
    /// permitted.
    async fn request_stream(&self, constraints: &CaptureConstraints) -> Result<CaptureStream>;
}

/// Advanced noise suppression stage
#[async_trait]
pub trait NoiseSuppressor: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the stage for a new input stream
    async fn attach(&self, stream: &CaptureStream, sample_rate: u32) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Which input feeds the conversion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSelector {
    /// No capture; a silent source keeps the graph running
    #[default]
    None,
    /// Capture device by id
    Device(String),
    /// Stream supplied by the caller
    #[serde(skip)]
    External(CaptureStream),
}

impl fmt::Display for InputSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSelector::None => write!(f, "none"),
            InputSelector::Device(id) => write!(f, "{}", id),
            InputSelector::External(stream) => write!(f, "external stream {}", stream.id),
        }
    }
}

/// Input-side settings consumed by a rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalGraphConfig {
    pub input: InputSelector,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub advanced_noise_suppression: bool,
    pub sample_rate: u32,
}

impl Default for SignalGraphConfig {
    fn default() -> Self {
        Self {
            input: InputSelector::None,
            echo_cancellation: true,
            noise_suppression: true,
            advanced_noise_suppression: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl SignalGraphConfig {
    /// Whether switching from `self` to `next` needs a rebuild
    pub fn requires_rebuild(&self, next: &SignalGraphConfig) -> bool {
        self != next
    }

    fn constraints(&self, device_id: &str) -> CaptureConstraints {
        CaptureConstraints {
            device_id: device_id.to_string(),
            channel_count: 1,
            sample_rate: self.sample_rate,
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
            auto_gain_control: false,
        }
    }
}

/// Gains of the fixed gain nodes, kept across rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteGains {
    pub input: f32,
    pub output: f32,
    pub monitor: f32,
}

impl Default for RouteGains {
    fn default() -> Self {
        Self {
            input: 1.0,
            output: 1.0,
            monitor: 1.0,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ControllerPhase {
    #[default]
    Idle,
    Reconfiguring,
    /// The last rebuild failed or was cancelled
    ///
    /// Stays set until the next rebuild or teardown instead of dropping back
    /// to `Idle` on its own, so a caller polling after the error was returned
    /// still sees it. The graph is inactive and the lock is free either way.
    Failed,
}

/// What a successful rebuild hands back to the caller
#[derive(Debug, Clone)]
pub struct RoutingHandles {
    pub generation: u64,
    pub stream: Option<CaptureStream>,
    pub input_tap: LevelTap,
    pub output_tap: LevelTap,
    pub table: Arc<RoutingTable>,
}

#[derive(Debug, Default)]
struct ControllerState {
    phase: ControllerPhase,
    last_failure: Option<String>,
    stream: Option<CaptureStream>,
    routing: Option<Arc<RoutingTable>>,
    config: Option<SignalGraphConfig>,
    gains: RouteGains,
}

/// Owns the routing graph and the capture stream feeding it
pub struct SignalGraphController {
    capture: Arc<dyn DeviceCapture>,
    suppressor: Option<Arc<dyn NoiseSuppressor>>,
    lock: ReconfigureLock,
    input_tap: LevelTap,
    output_tap: LevelTap,
    state: Mutex<ControllerState>,
}

impl SignalGraphController {
    pub fn new(capture: Arc<dyn DeviceCapture>) -> Self {
        Self {
            capture,
            suppressor: None,
            lock: ReconfigureLock::new(),
            input_tap: LevelTap::new(),
            output_tap: LevelTap::new(),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Use `suppressor` when advanced noise suppression is requested
    pub fn with_suppressor(mut self, suppressor: Arc<dyn NoiseSuppressor>) -> Self {
        self.suppressor = Some(suppressor);
        self
    }

    /// Rebuild the graph for `config`
    ///
    /// Calls queue in arrival order; a later call always finishes after an
    /// earlier one.
    ///
    /// # Errors
    /// `DeviceAcquisitionFailure` if the capture request fails,
    /// `TransformFailure` if the noise suppression stage cannot attach. In
    /// both cases the graph is left without an input source and the lock is
    /// released.
    ///
    /// Dropping the returned future mid-rebuild stops any stream acquired so
    /// far and leaves the controller `Failed`.
    pub async fn reconfigure(&self, config: SignalGraphConfig) -> Result<RoutingHandles> {
        let guard = self.lock.acquire().await;
        let generation = guard.generation();
        self.state.lock().phase = ControllerPhase::Reconfiguring;
        let mut pending = PendingRebuild {
            controller: self,
            generation,
            settled: false,
        };
        info!(generation, input = %config.input, "reconfiguring signal graph");

        let result = match self.tear_down_input(generation) {
            Ok(()) => self.build(&config, generation).await,
            Err(e) => Err(e),
        };
        pending.settled = true;
        let mut state = self.state.lock();
        match result {
            Ok(mut table) => {
                apply_gains(&mut table, &state.gains);
                let table = Arc::new(table);
                state.routing = Some(table.clone());
                state.config = Some(config);
                state.phase = ControllerPhase::Idle;
                state.last_failure = None;
                info!(generation, nodes = table.len(), "signal graph ready");
                Ok(RoutingHandles {
                    generation,
                    stream: state.stream.clone(),
                    input_tap: self.input_tap.clone(),
                    output_tap: self.output_tap.clone(),
                    table,
                })
            }
            Err(e) => {
                warn!(generation, error = %e, "signal graph reconfiguration failed");
                if let Some(stream) = state.stream.take() {
                    stream.stop_tracks();
                }
                state.phase = ControllerPhase::Failed;
                state.last_failure = Some(e.to_string());
                state.config = Some(config);
                Err(e)
            }
        }
    }

    /// Handles for the graph in place, if a rebuild last succeeded
    pub fn handles(&self) -> Option<RoutingHandles> {
        let state = self.state.lock();
        if state.phase != ControllerPhase::Idle {
            return None;
        }
        let table = state.routing.clone()?;
        Some(RoutingHandles {
            generation: table.generation(),
            stream: state.stream.clone(),
            input_tap: self.input_tap.clone(),
            output_tap: self.output_tap.clone(),
            table,
        })
    }

    /// Stop capture and drop the routing graph
    pub async fn teardown(&self) {
        let guard = self.lock.acquire().await;
        let mut state = self.state.lock();
        if let Some(stream) = state.stream.take() {
            stream.stop_tracks();
        }
        state.routing = None;
        state.phase = ControllerPhase::Idle;
        state.last_failure = None;
        self.input_tap.clear();
        self.output_tap.clear();
        debug!(generation = guard.generation(), "signal graph torn down");
    }

    pub fn phase(&self) -> ControllerPhase {
        self.state.lock().phase
    }

    pub fn last_failure(&self) -> Option<String> {
        self.state.lock().last_failure.clone()
    }

    /// Generation of the routing table in place (0 before the first rebuild)
    pub fn generation(&self) -> u64 {
        self.state
            .lock()
            .routing
            .as_ref()
            .map(|t| t.generation())
            .unwrap_or(0)
    }

    pub fn current_routing(&self) -> Option<Arc<RoutingTable>> {
        self.state.lock().routing.clone()
    }

    pub fn current_stream(&self) -> Option<CaptureStream> {
        self.state.lock().stream.clone()
    }

    /// Configuration of the most recent rebuild attempt
    pub fn config(&self) -> Option<SignalGraphConfig> {
        self.state.lock().config.clone()
    }

    /// Whether an input source currently feeds conversion
    pub fn is_active(&self) -> bool {
        self.current_routing()
            .map(|table| has_input(&table))
            .unwrap_or(false)
    }

    pub fn input_tap(&self) -> &LevelTap {
        &self.input_tap
    }

    pub fn output_tap(&self) -> &LevelTap {
        &self.output_tap
    }

    pub fn gains(&self) -> RouteGains {
        self.state.lock().gains
    }

    pub fn set_input_gain(&self, gain: f32) -> f32 {
        self.update_gain(NodeKind::InputGain, gain, |g, v| g.input = v)
    }

    pub fn set_output_gain(&self, gain: f32) -> f32 {
        self.update_gain(NodeKind::OutputGain, gain, |g, v| g.output = v)
    }

    pub fn set_monitor_gain(&self, gain: f32) -> f32 {
        self.update_gain(NodeKind::MonitorGain, gain, |g, v| g.monitor = v)
    }

    fn update_gain(
        &self,
        kind: NodeKind,
        gain: f32,
        store: impl FnOnce(&mut RouteGains, f32),
    ) -> f32 {
        let clamped = clamp_gain(gain);
        if clamped != gain {
            warn!(requested = gain, applied = clamped, "gain clamped to [0, 1]");
        }

        let mut state = self.state.lock();
        store(&mut state.gains, clamped);
        if let Some(current) = state.routing.as_ref() {
            let mut table = RoutingTable::clone(current);
            table.set_gain(&kind, clamped);
            state.routing = Some(Arc::new(table));
        }
        clamped
    }

    /// Stop the previous capture and leave only the output side wired
    fn tear_down_input(&self, generation: u64) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(stream) = state.stream.take() {
            stream.stop_tracks();
        }
        let mut table = output_only(generation)?;
        apply_gains(&mut table, &state.gains);
        state.routing = Some(Arc::new(table));
        self.input_tap.clear();
        self.output_tap.clear();
        Ok(())
    }

    /// Acquire the input and wire the full table
    ///
    /// The acquired stream is recorded in the controller state as soon as it
    /// exists, so a cancelled or failed rebuild can still stop it.
    async fn build(&self, config: &SignalGraphConfig, generation: u64) -> Result<RoutingTable> {
        let stream = match &config.input {
            InputSelector::None => None,
            InputSelector::Device(device_id) => {
                let constraints = config.constraints(device_id);
                let stream = self
                    .capture
                    .request_stream(&constraints)
                    .await
                    .map_err(|e| match e {
                        e @ AmbienceError::DeviceAcquisitionFailure { .. } => e,
                        other => AmbienceError::DeviceAcquisitionFailure {
                            selector: device_id.clone(),
                            reason: other.to_string(),
                        },
                    })?;
                Some(stream)
            }
            InputSelector::External(stream) => Some(stream.clone()),
        };
        self.state.lock().stream = stream.clone();

        let transform = self.prepare_transform(config, stream.as_ref()).await?;

        let mut table = RoutingTable::new(generation);
        let source = match &stream {
            Some(stream) => table.add_node(NodeKind::Capture {
                stream_id: stream.id(),
                device: stream.device_id().to_string(),
            }),
            None => table.add_node(NodeKind::Silence),
        };
        let input_gain = table.add_node(NodeKind::InputGain);
        table.connect(source, input_gain)?;

        let mut tail = input_gain;
        if let Some(name) = transform {
            let node = table.add_node(NodeKind::NoiseTransform { name });
            table.connect(tail, node)?;
            tail = node;
        }

        let input_tap = table.add_node(NodeKind::LevelTap(TapSide::Input));
        table.connect(tail, input_tap)?;

        let conversion_in = wire_output_side(&mut table)?;
        table.connect(tail, conversion_in)?;
        table.validate()?;

        Ok(table)
    }

    /// Name of the transform stage to insert, if any
    async fn prepare_transform(
        &self,
        config: &SignalGraphConfig,
        stream: Option<&CaptureStream>,
    ) -> Result<Option<String>> {
        if !config.advanced_noise_suppression {
            return Ok(None);
        }
        let Some(suppressor) = self.suppressor.as_ref() else {
            warn!("advanced noise suppression requested but no suppressor is configured");
            return Ok(None);
        };
        let Some(stream) = stream else {
            return Ok(None);
        };

        suppressor
            .attach(stream, config.sample_rate)
            .await
            .map_err(|e| match e {
                e @ AmbienceError::TransformFailure { .. } => e,
                other => AmbienceError::TransformFailure {
                    reason: other.to_string(),
                },
            })?;
        Ok(Some(suppressor.name().to_string()))
    }
}

impl fmt::Debug for SignalGraphController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SignalGraphController")
            .field("phase", &state.phase)
            .field("stream", &state.stream)
            .field("generation", &state.routing.as_ref().map(|t| t.generation()))
            .finish()
    }
}

/// Settles a rebuild whose future was dropped before it finished
struct PendingRebuild<'a> {
    controller: &'a SignalGraphController,
    generation: u64,
    settled: bool,
}

impl Drop for PendingRebuild<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.controller.state.lock();
        if let Some(stream) = state.stream.take() {
            stream.stop_tracks();
        }
        state.phase = ControllerPhase::Failed;
        state.last_failure = Some("reconfiguration cancelled".to_string());
        warn!(generation = self.generation, "signal graph reconfiguration cancelled");
    }
}

/// Conversion, output gain, monitor gain, destinations, effect gain and the
/// output tap. Returns the conversion entry node.
fn wire_output_side(table: &mut RoutingTable) -> Result<NodeId> {
    let conversion_in = table.add_node(NodeKind::ConversionIn);
    let conversion_out = table.add_node(NodeKind::ConversionOut);
    table.connect(conversion_in, conversion_out)?;

    let output_gain = table.add_node(NodeKind::OutputGain);
    let destination = table.add_node(NodeKind::Destination);
    table.connect(conversion_out, output_gain)?;
    table.connect(output_gain, destination)?;

    let monitor_gain = table.add_node(NodeKind::MonitorGain);
    let monitor_destination = table.add_node(NodeKind::MonitorDestination);
    table.connect(conversion_out, monitor_gain)?;
    table.connect(monitor_gain, monitor_destination)?;

    let effect_gain = table.add_node(NodeKind::EffectGain);
    table.connect(effect_gain, output_gain)?;

    let output_tap = table.add_node(NodeKind::LevelTap(TapSide::Output));
    table.connect(conversion_out, output_tap)?;

    Ok(conversion_in)
}

fn output_only(generation: u64) -> Result<RoutingTable> {
    let mut table = RoutingTable::new(generation);
    wire_output_side(&mut table)?;
    Ok(table)
}

fn apply_gains(table: &mut RoutingTable, gains: &RouteGains) {
    table.set_gain(&NodeKind::InputGain, gains.input);
    table.set_gain(&NodeKind::OutputGain, gains.output);
    table.set_gain(&NodeKind::MonitorGain, gains.monitor);
}

fn has_input(table: &RoutingTable) -> bool {
    match table.find(|k| *k == NodeKind::ConversionIn) {
        Some(conversion) => !table.inputs_of(conversion).is_empty(),
        None => false,
    }
}
