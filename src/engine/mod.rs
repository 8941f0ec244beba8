//! Audio Engine Module
//!
//! Core audio data types:
//! - Audio buffer management
//! - Decoded effect assets
//! - WAV decoding and encoding

pub mod asset;
pub mod buffer;
pub mod io;

pub use asset::AudioAsset;
pub use buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
pub use io::{decode_wav, encode_wav, generate_test_tone, read_wav_file};
