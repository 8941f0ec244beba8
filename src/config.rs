//! Engine configuration
//!
//! Settings are read from a JSON file (missing fields take their defaults)
//! and can be overridden from the environment.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dsp::{clamp_gain, DEFAULT_SILENCE_BUDGET_MS, DEFAULT_THRESHOLD_DB};
use crate::error::{AmbienceError, Result};
use crate::graph::{RouteGains, SignalGraphConfig};
use crate::session::DEFAULT_MONITOR_PERIOD_MS;

pub const ENV_SFX_DIR: &str = "AMBIENCE_SFX_DIR";
pub const ENV_SFX_GAIN: &str = "AMBIENCE_SFX_GAIN";
pub const ENV_SFX_THRESHOLD_DB: &str = "AMBIENCE_SFX_THRESHOLD_DB";

/// Everything a session needs to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Effect directory holding `index.json`
    pub sfx_directory: String,
    pub sfx_gain: f32,
    /// Trigger level for both activity start and stop
    pub sfx_threshold_db: f32,
    pub silence_budget_ms: f64,
    pub monitor_period_ms: u64,
    /// Library index of the effect to loop
    pub selected_effect: usize,
    pub input_gain: f32,
    pub output_gain: f32,
    pub monitor_gain: f32,
    pub graph: SignalGraphConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sfx_directory: "sfx".to_string(),
            sfx_gain: 1.0,
            sfx_threshold_db: DEFAULT_THRESHOLD_DB,
            silence_budget_ms: DEFAULT_SILENCE_BUDGET_MS,
            monitor_period_ms: DEFAULT_MONITOR_PERIOD_MS,
            selected_effect: 0,
            input_gain: 1.0,
            output_gain: 1.0,
            monitor_gain: 1.0,
            graph: SignalGraphConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Read settings from a JSON file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Serialization` if it is not valid
    /// settings JSON, `ConfigurationError` if a value is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut settings: EngineSettings = serde_json::from_str(&json)?;
        settings.validate()?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Override fields from `AMBIENCE_SFX_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Override fields from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_SFX_DIR) {
            self.sfx_directory = dir;
        }
        if let Some(gain) = lookup(ENV_SFX_GAIN) {
            self.sfx_gain = parse_var(ENV_SFX_GAIN, &gain)?;
        }
        if let Some(threshold) = lookup(ENV_SFX_THRESHOLD_DB) {
            self.sfx_threshold_db = parse_var(ENV_SFX_THRESHOLD_DB, &threshold)?;
        }
        self.validate()
    }

    /// Reject non-finite values and clamp gains into [0, 1]
    pub fn validate(&mut self) -> Result<()> {
        let gains = [
            ("sfx_gain", self.sfx_gain),
            ("input_gain", self.input_gain),
            ("output_gain", self.output_gain),
            ("monitor_gain", self.monitor_gain),
        ];
        for (param, value) in gains {
            if !value.is_finite() {
                return Err(invalid(param, value, "a finite gain"));
            }
        }
        if !self.sfx_threshold_db.is_finite() {
            return Err(invalid("sfx_threshold_db", self.sfx_threshold_db, "a finite dB value"));
        }
        if !self.silence_budget_ms.is_finite() || self.silence_budget_ms < 0.0 {
            return Err(invalid(
                "silence_budget_ms",
                self.silence_budget_ms,
                "a finite, non-negative duration",
            ));
        }
        if self.monitor_period_ms == 0 {
            return Err(invalid("monitor_period_ms", 0, "a positive period"));
        }
        if self.graph.sample_rate == 0 {
            return Err(invalid("graph.sample_rate", 0, "a positive sample rate"));
        }

        for gain in [
            &mut self.sfx_gain,
            &mut self.input_gain,
            &mut self.output_gain,
            &mut self.monitor_gain,
        ] {
            let clamped = clamp_gain(*gain);
            if clamped != *gain {
                warn!(requested = *gain, applied = clamped, "gain clamped to [0, 1]");
                *gain = clamped;
            }
        }
        Ok(())
    }

    pub fn monitor_period(&self) -> Duration {
        Duration::from_millis(self.monitor_period_ms)
    }

    pub fn route_gains(&self) -> RouteGains {
        RouteGains {
            input: self.input_gain,
            output: self.output_gain,
            monitor: self.monitor_gain,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AmbienceError::ConfigurationError {
            param: key.to_string(),
            value: raw.to_string(),
            expected: "a number".to_string(),
        })
}

fn invalid(param: &str, value: impl ToString, expected: &str) -> AmbienceError {
    AmbienceError::ConfigurationError {
        param: param.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InputSelector;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.sfx_threshold_db, -40.0);
        assert_eq!(settings.silence_budget_ms, 1300.0);
        assert_eq!(settings.monitor_period(), Duration::from_millis(100));
        assert_eq!(settings.graph.input, InputSelector::None);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"sfx_gain": 0.3, "sfx_threshold_db": -35, "graph": {"input": {"device": "mic-1"}}}"#,
        )
        .unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.sfx_gain, 0.3);
        assert_eq!(settings.sfx_threshold_db, -35.0);
        assert_eq!(settings.sfx_directory, "sfx");
        assert_eq!(
            settings.graph.input,
            InputSelector::Device("mic-1".to_string())
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = EngineSettings {
            selected_effect: 2,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(EngineSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = EngineSettings::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_SFX_DIR, "/srv/sfx"),
            (ENV_SFX_GAIN, "1.8"),
            (ENV_SFX_THRESHOLD_DB, " -30 "),
        ]
        .into_iter()
        .collect();

        let mut settings = EngineSettings::default();
        settings
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.sfx_directory, "/srv/sfx");
        assert_eq!(settings.sfx_gain, 1.0);
        assert_eq!(settings.sfx_threshold_db, -30.0);
    }

    #[test]
    fn test_override_parse_error() {
        let mut settings = EngineSettings::default();
        let err = settings
            .apply_overrides(|key| (key == ENV_SFX_GAIN).then(|| "loud".to_string()))
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut settings = EngineSettings {
            sfx_threshold_db: f32::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings {
            silence_budget_ms: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
