//! Activity gate
//!
//! Decides when the ambient effect should be audible. Microphone input above
//! the threshold opens the gate; the gate closes only after the converted
//! output has stayed at or below the threshold for a whole silence budget.
//! The asymmetry (instant open, sustained close) keeps the effect from
//! flickering between words.

use std::fmt;

use tracing::debug;

use crate::error::{AmbienceError, Result};

/// Default silence budget before the gate closes
pub const DEFAULT_SILENCE_BUDGET_MS: f64 = 1300.0;

/// Default trigger threshold in dB
pub const DEFAULT_THRESHOLD_DB: f32 = -40.0;

/// Gate phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePhase {
    /// Effect silent
    #[default]
    Idle,
    /// Effect audible
    Active,
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePhase::Idle => write!(f, "Idle"),
            GatePhase::Active => write!(f, "Active"),
        }
    }
}

/// Transition signal for the loop player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    Start,
    Stop,
}

/// Snapshot of the gate's state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityState {
    pub phase: GatePhase,
    pub threshold_db: f32,
    pub silence_budget_ms: f64,
    pub accumulated_silence_ms: f64,
    /// Gain currently applied to the effect (0 while idle)
    pub applied_gain: f32,
    /// Gain latched for the next activation
    pub pending_gain: f32,
}

/// Hysteresis state machine driven by input and output loudness
#[derive(Debug, Clone)]
pub struct ActivityGate {
    state: ActivityState,
}

impl ActivityGate {
    /// Create an idle gate
    ///
    /// # Arguments
    /// * `gain` - Effect gain applied on activation, clamped to [0, 1]
    /// * `threshold_db` - Trigger level for both input and output samples
    pub fn new(gain: f32, threshold_db: f32) -> Result<Self> {
        let mut gate = Self {
            state: ActivityState {
                phase: GatePhase::Idle,
                threshold_db: DEFAULT_THRESHOLD_DB,
                silence_budget_ms: DEFAULT_SILENCE_BUDGET_MS,
                accumulated_silence_ms: 0.0,
                applied_gain: 0.0,
                pending_gain: 0.0,
            },
        };
        gate.set_threshold_db(threshold_db)?;
        gate.set_gain(gain);
        Ok(gate)
    }

    pub fn state(&self) -> &ActivityState {
        &self.state
    }

    pub fn phase(&self) -> GatePhase {
        self.state.phase
    }

    pub fn is_active(&self) -> bool {
        self.state.phase == GatePhase::Active
    }

    pub fn applied_gain(&self) -> f32 {
        self.state.applied_gain
    }

    /// Feed a microphone-side level
    ///
    /// Opens the gate when the level exceeds the threshold. Returns `Start`
    /// only on the Idle → Active edge.
    pub fn feed_input(&mut self, level_db: f32) -> Option<GateSignal> {
        if self.state.phase == GatePhase::Idle && level_db > self.state.threshold_db {
            debug!(level_db, threshold_db = self.state.threshold_db, "activity gate opened");
            self.activate();
            return Some(GateSignal::Start);
        }
        None
    }

    /// Feed a converted-output level covering `dt_ms` milliseconds
    ///
    /// Ignored while idle. Loud output resets the silence accumulator; quiet
    /// output accumulates until the budget is spent, then closes the gate.
    pub fn feed_output(&mut self, level_db: f32, dt_ms: f64) -> Option<GateSignal> {
        if self.state.phase != GatePhase::Active {
            return None;
        }

        if level_db > self.state.threshold_db {
            self.state.accumulated_silence_ms = 0.0;
            return None;
        }

        self.state.accumulated_silence_ms += dt_ms.max(0.0);
        if self.state.accumulated_silence_ms >= self.state.silence_budget_ms {
            debug!(
                silence_ms = self.state.accumulated_silence_ms,
                "activity gate closed after sustained silence"
            );
            self.deactivate();
            return Some(GateSignal::Stop);
        }
        None
    }

    /// Force the gate open (manual start)
    pub fn activate(&mut self) {
        self.state.phase = GatePhase::Active;
        self.state.applied_gain = self.state.pending_gain;
        self.state.accumulated_silence_ms = 0.0;
    }

    /// Force the gate closed (manual stop or session end)
    pub fn deactivate(&mut self) {
        self.state.phase = GatePhase::Idle;
        self.state.applied_gain = 0.0;
        self.state.accumulated_silence_ms = 0.0;
    }

    /// Set the effect gain
    ///
    /// Always latched for the next activation; applied immediately while
    /// active. Values outside [0, 1] are clamped, NaN becomes 0.
    pub fn set_gain(&mut self, gain: f32) -> f32 {
        let clamped = clamp_gain(gain);
        self.state.pending_gain = clamped;
        if self.state.phase == GatePhase::Active {
            self.state.applied_gain = clamped;
        }
        clamped
    }

    /// Set the trigger threshold in dB
    ///
    /// Any finite value is accepted. Past samples are not re-evaluated.
    pub fn set_threshold_db(&mut self, threshold_db: f32) -> Result<()> {
        if !threshold_db.is_finite() {
            return Err(AmbienceError::ConfigurationError {
                param: "threshold_db".to_string(),
                value: threshold_db.to_string(),
                expected: "a finite dB value".to_string(),
            });
        }
        self.state.threshold_db = threshold_db;
        Ok(())
    }

    /// Set how long output must stay quiet before the gate closes
    pub fn set_silence_budget_ms(&mut self, budget_ms: f64) -> Result<()> {
        if !budget_ms.is_finite() || budget_ms < 0.0 {
            return Err(AmbienceError::ConfigurationError {
                param: "silence_budget_ms".to_string(),
                value: budget_ms.to_string(),
                expected: "a finite, non-negative duration".to_string(),
            });
        }
        self.state.silence_budget_ms = budget_ms;
        Ok(())
    }
}

impl Default for ActivityGate {
    fn default() -> Self {
        Self {
            state: ActivityState {
                phase: GatePhase::Idle,
                threshold_db: DEFAULT_THRESHOLD_DB,
                silence_budget_ms: DEFAULT_SILENCE_BUDGET_MS,
                accumulated_silence_ms: 0.0,
                applied_gain: 0.0,
                pending_gain: 1.0,
            },
        }
    }
}

/// Clamp a gain value to [0, 1]
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return 0.0;
    }
    gain.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gate(gain: f32, threshold: f32) -> ActivityGate {
        ActivityGate::new(gain, threshold).unwrap()
    }

    #[test]
    fn test_starts_idle_and_silent() {
        let g = gate(0.5, -40.0);
        assert_eq!(g.phase(), GatePhase::Idle);
        assert_eq!(g.applied_gain(), 0.0);
        assert_eq!(g.state().pending_gain, 0.5);
        assert_eq!(g.state().silence_budget_ms, DEFAULT_SILENCE_BUDGET_MS);
    }

    #[test]
    fn test_input_above_threshold_opens_once() {
        let mut g = gate(0.5, -40.0);
        let signals: Vec<_> = (0..20).filter_map(|_| g.feed_input(-10.0)).collect();
        assert_eq!(signals, vec![GateSignal::Start]);
        assert!(g.is_active());
        assert_eq!(g.applied_gain(), 0.5);
    }

    #[test]
    fn test_input_at_threshold_does_not_open() {
        let mut g = gate(0.5, -40.0);
        assert_eq!(g.feed_input(-40.0), None);
        assert_eq!(g.phase(), GatePhase::Idle);
    }

    #[test]
    fn test_output_ignored_while_idle() {
        let mut g = gate(0.5, -40.0);
        assert_eq!(g.feed_output(-90.0, 5000.0), None);
        assert_eq!(g.feed_output(0.0, 100.0), None);
        assert_eq!(g.phase(), GatePhase::Idle);
        assert_eq!(g.state().accumulated_silence_ms, 0.0);
    }

    #[test]
    fn test_silence_budget_boundary() {
        let mut g = gate(1.0, -40.0);
        g.feed_input(-10.0);

        assert_eq!(g.feed_output(-50.0, 1299.0), None);
        assert!(g.is_active());

        assert_eq!(g.feed_output(-50.0, 2.0), Some(GateSignal::Stop));
        assert_eq!(g.phase(), GatePhase::Idle);
        assert_eq!(g.applied_gain(), 0.0);
        assert_eq!(g.state().accumulated_silence_ms, 0.0);

        // No second stop
        assert_eq!(g.feed_output(-50.0, 5000.0), None);
    }

    #[test]
    fn test_output_at_threshold_counts_as_silence() {
        let mut g = gate(1.0, -40.0);
        g.feed_input(-10.0);
        g.feed_output(-40.0, 700.0);
        assert_relative_eq!(g.state().accumulated_silence_ms, 700.0);
    }

    #[test]
    fn test_loud_output_resets_accumulator() {
        let mut g = gate(1.0, -40.0);
        g.feed_input(-10.0);
        g.feed_output(-50.0, 1299.9);
        assert_eq!(g.feed_output(-20.0, 100.0), None);
        assert_eq!(g.state().accumulated_silence_ms, 0.0);

        assert_eq!(g.feed_output(-50.0, 1000.0), None);
        assert!(g.is_active());
    }

    #[test]
    fn test_gain_latched_while_idle_and_live_while_active() {
        let mut g = gate(0.3, -35.0);
        g.set_gain(0.8);
        assert_eq!(g.applied_gain(), 0.0);

        g.feed_input(-10.0);
        assert_eq!(g.applied_gain(), 0.8);

        g.set_gain(0.2);
        assert_eq!(g.applied_gain(), 0.2);
        assert_eq!(g.state().pending_gain, 0.2);
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut g = gate(0.3, -35.0);
        assert_eq!(g.set_gain(1.7), 1.0);
        assert_eq!(g.set_gain(-0.5), 0.0);
        assert_eq!(g.set_gain(f32::NAN), 0.0);
    }

    #[test]
    fn test_threshold_change_is_not_retroactive() {
        let mut g = gate(1.0, -40.0);
        g.feed_input(-10.0);
        g.feed_output(-50.0, 1000.0);

        // Raising the threshold keeps the already accumulated silence
        g.set_threshold_db(-20.0).unwrap();
        assert_relative_eq!(g.state().accumulated_silence_ms, 1000.0);
        assert_eq!(g.feed_output(-30.0, 300.0), Some(GateSignal::Stop));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut g = ActivityGate::default();
        assert!(g.set_threshold_db(f32::NAN).is_err());
        assert!(g.set_threshold_db(f32::NEG_INFINITY).is_err());
        assert!(g.set_threshold_db(-120.0).is_ok());
        assert!(g.set_silence_budget_ms(-1.0).is_err());
        assert!(g.set_silence_budget_ms(f64::INFINITY).is_err());
        assert!(ActivityGate::new(0.5, f32::NAN).is_err());
    }

    #[test]
    fn test_manual_activation() {
        let mut g = gate(0.4, -40.0);
        g.activate();
        assert!(g.is_active());
        assert_eq!(g.applied_gain(), 0.4);
        // Input while active emits nothing
        assert_eq!(g.feed_input(0.0), None);

        g.deactivate();
        assert_eq!(g.phase(), GatePhase::Idle);
        assert_eq!(g.applied_gain(), 0.0);
    }
}
