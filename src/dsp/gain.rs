//! Effect gain stage
//!
//! The single gain node every loop source feeds. The stage is shared between
//! the loop player (which connects sources), the activity gate (which drives
//! its value) and the output path (which reads it while mixing). It accepts
//! at most one connected source at a time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dsp::gate::clamp_gain;
use crate::error::{AmbienceError, Result};

#[derive(Debug)]
struct GainStageInner {
    /// f32 bits of the current gain
    value: AtomicU32,
    /// Identifier of the connected loop source
    connected: Mutex<Option<u64>>,
}

/// Shared gain stage for the ambient effect
///
/// Cloning yields another handle to the same stage.
#[derive(Debug, Clone)]
pub struct GainStage {
    inner: Arc<GainStageInner>,
}

impl GainStage {
    /// Create a stage with the given initial gain (clamped to [0, 1])
    pub fn new(gain: f32) -> Self {
        Self {
            inner: Arc::new(GainStageInner {
                value: AtomicU32::new(clamp_gain(gain).to_bits()),
                connected: Mutex::new(None),
            }),
        }
    }

    /// Current gain value
    pub fn value(&self) -> f32 {
        f32::from_bits(self.inner.value.load(Ordering::Acquire))
    }

    /// Set the gain value, clamped to [0, 1]
    pub fn set(&self, gain: f32) {
        self.inner
            .value
            .store(clamp_gain(gain).to_bits(), Ordering::Release);
    }

    /// Connect a source to the stage
    ///
    /// # Errors
    /// `GainStageBusy` if a different source is still connected.
    pub fn attach(&self, source_id: u64) -> Result<()> {
        let mut connected = self.inner.connected.lock();
        match *connected {
            Some(existing) if existing != source_id => {
                Err(AmbienceError::GainStageBusy { attached: existing })
            }
            _ => {
                *connected = Some(source_id);
                Ok(())
            }
        }
    }

    /// Disconnect a source; returns false if it was not connected
    pub fn detach(&self, source_id: u64) -> bool {
        let mut connected = self.inner.connected.lock();
        if *connected == Some(source_id) {
            *connected = None;
            true
        } else {
            false
        }
    }

    /// Identifier of the connected source, if any
    pub fn connected(&self) -> Option<u64> {
        *self.inner.connected.lock()
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new(0.0)
    }
}
