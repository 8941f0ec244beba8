//! Loop player
//!
//! Owns at most one looping source. Starting a new loop always releases the
//! previous one (stop, then detach from the gain stage) before the new source
//! is attached, so the gain stage never sees two sources at once. There is no
//! crossfade: a restart is an audible cut.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::dsp::GainStage;
use crate::engine::AudioAsset;
use crate::error::{AmbienceError, Result};

/// Source ids are unique per process so two players sharing a stage never collide
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a loop source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Playing,
    Stopped,
}

/// The currently playing loop instance
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    asset: Arc<AudioAsset>,
    /// Next frame to render
    position: usize,
    state: SourceState,
}

impl PlaybackHandle {
    fn new(asset: Arc<AudioAsset>) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            asset,
            position: 0,
            state: SourceState::Playing,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asset(&self) -> &Arc<AudioAsset> {
        &self.asset
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn stop(&mut self) {
        self.state = SourceState::Stopped;
    }
}

/// Plays one effect asset in a seamless loop through the shared gain stage
#[derive(Debug)]
pub struct LoopPlayer {
    stage: GainStage,
    current: Option<PlaybackHandle>,
}

impl LoopPlayer {
    pub fn new(stage: GainStage) -> Self {
        Self {
            stage,
            current: None,
        }
    }

    /// The gain stage sources are connected to
    pub fn stage(&self) -> &GainStage {
        &self.stage
    }

    /// Start looping `asset` from its first frame
    ///
    /// Any source already playing is stopped and detached first.
    ///
    /// # Returns
    /// The id of the new source
    ///
    /// # Errors
    /// `EmptyLibrary` if the asset holds no frames, `GainStageBusy` if a
    /// source owned by someone else is connected to the stage.
    pub fn start(&mut self, asset: Arc<AudioAsset>) -> Result<u64> {
        self.release_current();

        if asset.frames() == 0 || asset.channel_count() == 0 {
            return Err(AmbienceError::EmptyLibrary);
        }

        let handle = PlaybackHandle::new(asset);
        self.stage.attach(handle.id)?;
        debug!(source = handle.id, asset = handle.asset.id(), "loop started");
        let id = handle.id;
        self.current = Some(handle);
        Ok(id)
    }

    /// Stop and detach the current source
    ///
    /// # Returns
    /// false if nothing was playing
    pub fn stop(&mut self) -> bool {
        self.release_current()
    }

    /// Forward a gain value to the shared stage
    pub fn set_gain(&self, gain: f32) {
        self.stage.set(gain);
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&PlaybackHandle> {
        self.current.as_ref()
    }

    /// Mix the loop into an interleaved output block
    ///
    /// The loop wraps around without a gap. Output channel `c` reads asset
    /// channel `min(c, channels - 1)`. The result is clipped to [-1, 1].
    pub fn render_into(&mut self, out: &mut [f32], channels: usize) {
        let Some(handle) = self.current.as_mut() else {
            return;
        };
        if channels == 0 {
            return;
        }

        let gain = self.stage.value();
        let buffer = handle.asset.buffer();
        let frames = buffer.len();
        let last_channel = buffer.channels() - 1;

        for frame in out.chunks_mut(channels) {
            for (c, sample) in frame.iter_mut().enumerate() {
                let source = buffer.channel(c.min(last_channel))[handle.position];
                *sample = (*sample + source * gain).clamp(-1.0, 1.0);
            }
            handle.position = (handle.position + 1) % frames;
        }
    }

    fn release_current(&mut self) -> bool {
        match self.current.take() {
            Some(mut previous) => {
                previous.stop();
                self.stage.detach(previous.id);
                debug!(source = previous.id, "loop released");
                true
            }
            None => false,
        }
    }
}

impl Drop for LoopPlayer {
    fn drop(&mut self) {
        self.release_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AudioBuffer;
    use approx::assert_relative_eq;

    fn asset(id: &str, samples: Vec<Vec<f32>>) -> Arc<AudioAsset> {
        Arc::new(AudioAsset::new(
            id,
            AudioBuffer::from_channels(samples, 48000).unwrap(),
        ))
    }

    #[test]
    fn test_start_twice_leaves_one_source() {
        let stage = GainStage::new(1.0);
        let mut player = LoopPlayer::new(stage.clone());

        let first = player.start(asset("a", vec![vec![0.1; 8]])).unwrap();
        assert_eq!(stage.connected(), Some(first));

        let second = player.start(asset("b", vec![vec![0.2; 8]])).unwrap();
        assert_ne!(first, second);
        assert_eq!(stage.connected(), Some(second));
        assert_eq!(player.current().unwrap().asset().id(), "b");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let stage = GainStage::new(1.0);
        let mut player = LoopPlayer::new(stage.clone());
        assert!(!player.stop());

        player.start(asset("a", vec![vec![0.1; 8]])).unwrap();
        assert!(player.stop());
        assert!(!player.stop());
        assert!(!player.is_playing());
        assert_eq!(stage.connected(), None);
    }

    #[test]
    fn test_start_fails_when_stage_owned_elsewhere() {
        let stage = GainStage::new(1.0);
        stage.attach(u64::MAX).unwrap();
        let mut player = LoopPlayer::new(stage.clone());

        let err = player.start(asset("a", vec![vec![0.1; 8]])).unwrap_err();
        assert_eq!(err.error_code(), "GAIN_STAGE_BUSY");
        assert!(!player.is_playing());
    }

    #[test]
    fn test_render_loops_without_gap() {
        let stage = GainStage::new(0.5);
        let mut player = LoopPlayer::new(stage);
        player
            .start(asset("ramp", vec![vec![0.2, 0.4, 0.6]]))
            .unwrap();

        let mut out = vec![0.0_f32; 7];
        player.render_into(&mut out, 1);

        let expected = [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1];
        for (got, want) in out.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
        assert_eq!(player.current().unwrap().position(), 1);
    }

    #[test]
    fn test_render_maps_mono_asset_to_stereo_and_clips() {
        let stage = GainStage::new(1.0);
        let mut player = LoopPlayer::new(stage);
        player.start(asset("mono", vec![vec![0.5, -0.5]])).unwrap();

        let mut out = vec![0.8_f32; 4];
        player.render_into(&mut out, 2);
        assert_eq!(out, vec![1.0, 1.0, 0.3, 0.3]);
    }

    #[test]
    fn test_render_without_source_is_passthrough() {
        let mut player = LoopPlayer::new(GainStage::new(1.0));
        let mut out = vec![0.25_f32; 4];
        player.render_into(&mut out, 2);
        assert_eq!(out, vec![0.25; 4]);
    }

    #[test]
    fn test_drop_detaches() {
        let stage = GainStage::new(1.0);
        {
            let mut player = LoopPlayer::new(stage.clone());
            player.start(asset("a", vec![vec![0.1; 4]])).unwrap();
        }
        assert_eq!(stage.connected(), None);
    }
}
