//! Decoded effect assets
//!
//! An asset is immutable once decoded. The library hands out `Arc<AudioAsset>`
//! so a loop that is still playing keeps its buffer alive across reloads.

use std::fmt;

use super::buffer::AudioBuffer;

/// A decoded background effect
#[derive(Clone, PartialEq)]
pub struct AudioAsset {
    id: String,
    buffer: AudioBuffer,
}

impl AudioAsset {
    /// Wrap a decoded buffer under the given identifier (usually the filename)
    pub fn new(id: impl Into<String>, buffer: AudioBuffer) -> Self {
        Self {
            id: id.into(),
            buffer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.buffer.channels()
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }

    /// Number of sample frames per channel
    pub fn frames(&self) -> usize {
        self.buffer.len()
    }
}

// Sample data is too large to be useful in debug output.
impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("id", &self.id)
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channel_count())
            .field("frames", &self.frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_metadata() {
        let asset = AudioAsset::new("rain.wav", AudioBuffer::silent(2, 96000, 48000));
        assert_eq!(asset.id(), "rain.wav");
        assert_eq!(asset.channel_count(), 2);
        assert_eq!(asset.frames(), 96000);
        assert!((asset.duration_secs() - 2.0).abs() < 1e-9);
        assert!(format!("{:?}", asset).contains("rain.wav"));
    }
}
