//! Audio file I/O for Ambience
//!
//! Effect assets arrive as WAV bytes (fetched from a directory or uploaded).
//! Decoding converts them to 32-bit float and, when a target rate is given,
//! resamples them to the session rate so loops play at the right pitch.
//! Sample rate conversion uses linear interpolation.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::asset::AudioAsset;
use crate::engine::buffer::AudioBuffer;
use crate::error::{AmbienceError, Result};

/// Decode WAV bytes into an effect asset
///
/// # Arguments
/// * `name` - Identifier for the asset (usually the manifest filename)
/// * `bytes` - Raw WAV container bytes
/// * `target_rate` - Resample to this rate if it differs from the file's rate
///
/// # Errors
/// * `DecodeFailure` - If the bytes are not a readable WAV file or hold no samples
pub fn decode_wav(name: &str, bytes: &[u8], target_rate: Option<u32>) -> Result<AudioAsset> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| AmbienceError::DecodeFailure {
        name: name.to_string(),
        reason: format!("not a WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let buffer = read_buffer(name, reader)?;
    let buffer = match target_rate {
        Some(rate) if rate != buffer.sample_rate && rate > 0 => AudioBuffer {
            samples: resample_channels(&buffer.samples, buffer.sample_rate, rate),
            sample_rate: rate,
        },
        _ => buffer,
    };

    Ok(AudioAsset::new(name, buffer))
}

/// Read a WAV file from disk without resampling
pub fn read_wav_file(path: &Path) -> Result<AudioBuffer> {
    let name = path.display().to_string();
    let reader = WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => AmbienceError::Io(io),
        other => AmbienceError::DecodeFailure {
            name: name.clone(),
            reason: other.to_string(),
            source: Some(Box::new(other)),
        },
    })?;
    read_buffer(&name, reader)
}

/// Encode a buffer as a 32-bit float WAV file in memory
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(to_io)?;
        for sample in buffer.to_interleaved() {
            writer.write_sample(sample).map_err(to_io)?;
        }
        writer.finalize().map_err(to_io)?;
    }
    Ok(cursor.into_inner())
}

/// Generate a sine tone with the same signal on every channel
///
/// Useful for testing the metering and playback paths.
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
    channels: usize,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let channel: Vec<f32> = (0..num_samples)
        .map(|i| amplitude * (angular_freq * i as f32).sin())
        .collect();

    AudioBuffer {
        samples: vec![channel; channels.max(1)],
        sample_rate,
    }
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn to_io(e: hound::Error) -> AmbienceError {
    match e {
        hound::Error::IoError(io) => AmbienceError::Io(io),
        other => AmbienceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

fn read_buffer<R: std::io::Read>(name: &str, reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples = read_samples_as_f32(name, reader, spec.bits_per_sample, spec.sample_format)?;

    if samples.is_empty() {
        return Err(AmbienceError::decode(name, "file contains no samples"));
    }

    AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate).map_err(|_| {
        AmbienceError::decode(
            name,
            format!("{} samples do not fill {} channels", samples.len(), channels),
        )
    })
}

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    name: &str,
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let failed = |e: hound::Error| AmbienceError::DecodeFailure {
        name: name.to_string(),
        reason: format!("failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(failed),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                other => {
                    return Err(AmbienceError::decode(
                        name,
                        format!("unsupported {}-bit integer audio", other),
                    ))
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(failed)
        }
    }
}

/// Resample audio channels to a different sample rate
fn resample_channels(channels: &[Vec<f32>], source_rate: u32, target_rate: u32) -> Vec<Vec<f32>> {
    let ratio = target_rate as f64 / source_rate as f64;
    channels
        .iter()
        .map(|channel| resample_linear(channel, ratio))
        .collect()
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_encode_decode_float_wav() {
        let tone = generate_test_tone(440.0, 0.5, 0.1, 48000, 2);
        let bytes = encode_wav(&tone).unwrap();

        let asset = decode_wav("tone.wav", &bytes, None).unwrap();
        assert_eq!(asset.id(), "tone.wav");
        assert_eq!(asset.channel_count(), 2);
        assert_eq!(asset.sample_rate(), 48000);
        assert_eq!(asset.frames(), tone.len());
        assert_relative_eq!(asset.buffer().channel(1)[10], tone.channel(1)[10]);
    }

    #[test]
    fn test_decode_16_bit_int() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for v in [0i16, 16384, -16384, 32767] {
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }

        let asset = decode_wav("int.wav", cursor.get_ref(), None).unwrap();
        let samples = asset.buffer().channel(0);
        assert_relative_eq!(samples[1], 0.5);
        assert_relative_eq!(samples[2], -0.5);
    }

    #[test]
    fn test_decode_garbage_is_decode_failure() {
        let err = decode_wav("broken.wav", b"definitely not audio", None).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_FAILURE");
    }

    #[test]
    fn test_decode_resamples_to_target_rate() {
        let tone = generate_test_tone(220.0, 0.5, 0.5, 24000, 1);
        let bytes = encode_wav(&tone).unwrap();

        let asset = decode_wav("tone.wav", &bytes, Some(48000)).unwrap();
        assert_eq!(asset.sample_rate(), 48000);
        assert_eq!(asset.frames(), tone.len() * 2);
        assert_relative_eq!(asset.duration_secs(), tone.duration_secs(), epsilon = 1e-3);
    }

    #[test]
    fn test_empty_wav_rejected() {
        let empty = AudioBuffer::silent(1, 0, 48000);
        let bytes = encode_wav(&empty).unwrap();
        assert!(decode_wav("empty.wav", &bytes, None).is_err());
    }
}
