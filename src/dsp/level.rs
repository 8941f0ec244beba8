//! Level metering
//!
//! Converts a frame of samples into a loudness figure in dB. The conversion
//! floors the RMS at [`LEVEL_EPSILON`] so silence reads as a finite
//! [`LEVEL_FLOOR_DB`] rather than negative infinity.

use std::sync::Arc;

use num_traits::Float;
use parking_lot::Mutex;

/// Smallest RMS value considered by the meter
pub const LEVEL_EPSILON: f64 = 1e-4;

/// Level reported for silent or empty frames: `20 * log10(1e-4)`
pub const LEVEL_FLOOR_DB: f32 = -80.0;

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Root-mean-square amplitude of a frame (0 for an empty frame)
pub fn rms<S: Float>(frame: &[S]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = frame
        .iter()
        .map(|s| s.to_f64().unwrap_or(0.0))
        .map(|s| s * s)
        .sum();
    (sum_squares / frame.len() as f64).sqrt()
}

/// Loudness of a frame in dB
///
/// `20 * log10(max(rms, 1e-4))`. Always finite, monotonic in RMS.
///
/// # Example
/// ```
/// use ambience::dsp::compute_level;
///
/// assert_eq!(compute_level(&[0.0_f32; 64]), -80.0);
/// assert!((compute_level(&[1.0_f32; 64])).abs() < 1e-6);
/// ```
pub fn compute_level<S: Float>(frame: &[S]) -> f32 {
    let value = rms(frame);
    let value = if value.is_finite() { value } else { 0.0 };
    (20.0 * value.max(LEVEL_EPSILON).log10()) as f32
}

// ============================================================================
// Level Tap
// ============================================================================

/// Analysis tap attached to a point in the routing graph
///
/// The audio path pushes its most recent frame; the activity monitor reads
/// the level of whatever frame was pushed last. Cloning shares the tap.
#[derive(Debug, Clone, Default)]
pub struct LevelTap {
    latest: Arc<Mutex<Vec<f32>>>,
}

impl LevelTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the analysed frame
    pub fn push(&self, frame: &[f32]) {
        let mut latest = self.latest.lock();
        latest.clear();
        latest.extend_from_slice(frame);
    }

    /// Loudness of the most recent frame
    pub fn level_db(&self) -> f32 {
        compute_level(self.latest.lock().as_slice())
    }

    /// Forget the last frame so the tap reads as silence
    pub fn clear(&self) {
        self.latest.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test]
    fn test_silence_is_floor() {
        assert_eq!(compute_level(&[0.0_f32; 128]), LEVEL_FLOOR_DB);
        assert_relative_eq!(LEVEL_FLOOR_DB as f64, 20.0 * LEVEL_EPSILON.log10());
    }

    #[test]
    fn test_empty_frame_is_floor() {
        let empty: [f32; 0] = [];
        assert_eq!(compute_level(&empty), LEVEL_FLOOR_DB);
    }

    #[test_case(1.0, 0.0 ; "full scale")]
    #[test_case(0.5, -6.0206 ; "half amplitude")]
    #[test_case(0.1, -20.0 ; "tenth amplitude")]
    #[test_case(0.01, -40.0 ; "hundredth amplitude")]
    fn test_dc_levels(amplitude: f32, expected_db: f32) {
        let frame = vec![amplitude; 256];
        assert_relative_eq!(compute_level(&frame), expected_db, epsilon = 1e-3);
    }

    #[test]
    fn test_level_is_monotonic_and_finite() {
        let mut previous = f32::NEG_INFINITY;
        for step in 0..200 {
            let amplitude = step as f32 * 0.005;
            let level = compute_level(&[amplitude, -amplitude, amplitude, -amplitude]);
            assert!(level.is_finite());
            assert!(level >= previous, "level dropped at amplitude {}", amplitude);
            previous = level;
        }
    }

    #[test]
    fn test_generic_over_f64() {
        assert_relative_eq!(compute_level(&[0.1_f64; 32]), -20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_tap_reports_latest_frame() {
        let tap = LevelTap::new();
        assert_eq!(tap.level_db(), LEVEL_FLOOR_DB);

        tap.push(&[0.1; 64]);
        assert_relative_eq!(tap.level_db(), -20.0, epsilon = 1e-3);

        let shared = tap.clone();
        shared.push(&[1.0; 64]);
        assert_relative_eq!(tap.level_db(), 0.0, epsilon = 1e-4);

        tap.clear();
        assert_eq!(shared.level_db(), LEVEL_FLOOR_DB);
    }

    #[test]
    fn test_db_to_linear_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 0.001);
    }
}
