//! Ambient effect
//!
//! Pairs the activity gate with the loop player. Every level sample runs the
//! gate transition, the player transition and the gain stage update in one
//! call, so the caller holds a single lock per sample.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dsp::{ActivityGate, ActivityState, GatePhase, GainStage, GateSignal};
use crate::error::{AmbienceError, Result};
use crate::playback::{EffectLibrary, LoopPlayer};

/// Gate-driven looping effect
#[derive(Debug)]
pub struct AmbientEffect {
    gate: ActivityGate,
    player: LoopPlayer,
    library: Arc<EffectLibrary>,
    /// Index of the asset to loop
    selected: usize,
}

impl AmbientEffect {
    pub fn new(gate: ActivityGate, stage: GainStage, library: Arc<EffectLibrary>) -> Self {
        let effect = Self {
            gate,
            player: LoopPlayer::new(stage),
            library,
            selected: 0,
        };
        effect.sync_stage();
        effect
    }

    pub fn state(&self) -> &ActivityState {
        self.gate.state()
    }

    pub fn phase(&self) -> GatePhase {
        self.gate.phase()
    }

    pub fn player(&self) -> &LoopPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut LoopPlayer {
        &mut self.player
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Choose which library asset plays on the next start
    pub fn select(&mut self, index: usize) {
        self.selected = index;
    }

    /// Feed a microphone level sample
    pub fn feed_input(&mut self, level_db: f32) -> Option<GateSignal> {
        let signal = self.gate.feed_input(level_db);
        self.apply(signal);
        signal
    }

    /// Feed a converted-output level sample covering `dt_ms`
    pub fn feed_output(&mut self, level_db: f32, dt_ms: f64) -> Option<GateSignal> {
        let signal = self.gate.feed_output(level_db, dt_ms);
        self.apply(signal);
        signal
    }

    /// Open the gate and start the loop regardless of levels
    ///
    /// # Errors
    /// `EmptyLibrary` if there is nothing to play; the gate stays closed.
    pub fn start(&mut self) -> Result<()> {
        let asset = self
            .library
            .select(self.selected)
            .ok_or(AmbienceError::EmptyLibrary)?;
        self.player.start(asset)?;
        self.gate.activate();
        self.sync_stage();
        Ok(())
    }

    /// Close the gate and stop the loop
    pub fn stop(&mut self) {
        self.gate.deactivate();
        self.player.stop();
        self.sync_stage();
    }

    /// Set the effect gain; returns the value actually stored
    pub fn set_gain(&mut self, gain: f32) -> f32 {
        let clamped = self.gate.set_gain(gain);
        if clamped != gain {
            warn!(requested = gain, applied = clamped, "effect gain clamped to [0, 1]");
        }
        self.sync_stage();
        clamped
    }

    pub fn set_threshold_db(&mut self, threshold_db: f32) -> Result<()> {
        self.gate.set_threshold_db(threshold_db)
    }

    pub fn set_silence_budget_ms(&mut self, budget_ms: f64) -> Result<()> {
        self.gate.set_silence_budget_ms(budget_ms)
    }

    /// Mix the loop into an interleaved block of converted output
    pub fn render_into(&mut self, out: &mut [f32], channels: usize) {
        self.player.render_into(out, channels);
    }

    fn apply(&mut self, signal: Option<GateSignal>) {
        match signal {
            Some(GateSignal::Start) => match self.library.select(self.selected) {
                Some(asset) => {
                    if let Err(e) = self.player.start(asset) {
                        warn!(error = %e, "could not start ambient loop");
                    }
                }
                None => warn!("activity detected but the effect library is empty"),
            },
            Some(GateSignal::Stop) => {
                self.player.stop();
            }
            None => return,
        }
        self.sync_stage();
        debug!(phase = %self.gate.phase(), gain = self.gate.applied_gain(), "ambient effect transition");
    }

    fn sync_stage(&self) {
        self.player.set_gain(self.gate.applied_gain());
    }
}
