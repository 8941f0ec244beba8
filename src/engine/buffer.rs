//! Audio Buffer Management
//!
//! Non-interleaved 32-bit float buffers used for decoded effect assets and
//! for frames moving through the session.

use crate::error::{AmbienceError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate used when the caller does not specify one (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Audio Buffer
// ============================================================================

/// Decoded multichannel PCM audio
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate `Vec<f32>` and all channels have equal length.
///
/// # Example
/// ```
/// use ambience::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::silent(2, 48000, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer with `channels` channels of `num_samples` samples
    pub fn silent(channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; channels],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// `DecodeFailure` if there are no channels or channel lengths differ.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(AmbienceError::decode("buffer", "no channels"));
        };
        let len = first.len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(AmbienceError::decode("buffer", "channel lengths differ"));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `channels` - Number of interleaved channels
    /// * `sample_rate` - Sample rate in Hz
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AmbienceError::decode("buffer", "zero channels"));
        }
        if interleaved.len() % channels != 0 {
            return Err(AmbienceError::decode(
                "buffer",
                format!(
                    "interleaved length {} is not divisible by channel count {}",
                    interleaved.len(),
                    channels
                ),
            ));
        }

        let num_samples = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(num_samples); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.len());
        for index in 0..self.len() {
            for channel in &self.samples {
                interleaved.push(channel[index]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Fold all channels into a single mono frame (average)
    pub fn mixdown(&self) -> Vec<f32> {
        let channels = self.channels();
        if channels == 0 {
            return Vec::new();
        }
        (0..self.len())
            .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() / channels as f32)
            .collect()
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::silent(1, 0, DEFAULT_SAMPLE_RATE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_silent() {
        let buffer = AudioBuffer::silent(2, 100, 44100);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 100);
        assert!(buffer.samples.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::silent(1, 24000, 48000);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_buffer_from_interleaved_stereo() {
        let interleaved = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 48000).unwrap();
        assert_eq!(buffer.channel(0), &[0.1, 0.3, 0.5]);
        assert_eq!(buffer.channel(1), &[0.2, 0.4, 0.6]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_buffer_from_interleaved_invalid() {
        assert!(AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], 2, 48000).is_err());
        assert!(AudioBuffer::from_interleaved(&[0.1], 0, 48000).is_err());
    }

    #[test]
    fn test_from_channels_rejects_ragged() {
        assert!(AudioBuffer::from_channels(vec![vec![0.0; 3], vec![0.0; 2]], 48000).is_err());
        assert!(AudioBuffer::from_channels(Vec::new(), 48000).is_err());
    }

    #[test]
    fn test_mixdown_averages_channels() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![0.0, 0.5]], 48000).unwrap();
        assert_eq!(buffer.mixdown(), vec![0.5, 0.25]);
    }
}
