//! Error handling for Ambience
//!
//! Every failure surfaced to the caller carries an error code and, where it
//! makes sense, recovery suggestions for the operator.

use thiserror::Error;

/// Result type alias for Ambience operations
pub type Result<T> = std::result::Result<T, AmbienceError>;

/// Main error type for Ambience operations
#[derive(Error, Debug)]
pub enum AmbienceError {
    // Effect library errors
    #[error("Network failure fetching {url}: {reason}")]
    NetworkFailure {
        url: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to decode {name}: {reason}")]
    DecodeFailure {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Effect library is empty")]
    EmptyLibrary,

    #[error("Upload of {filename} failed: {reason}")]
    UploadFailure { filename: String, reason: String },

    // Routing errors
    #[error("Could not acquire capture input {selector}: {reason}")]
    DeviceAcquisitionFailure { selector: String, reason: String },

    #[error("Noise suppression stage failed: {reason}")]
    TransformFailure { reason: String },

    #[error("Invalid routing table: {reason}")]
    InvalidRouting { reason: String },

    #[error("Gain stage already has a connected source ({attached})")]
    GainStageBusy { attached: u64 },

    // Configuration errors
    #[error("Invalid value {value} for {param} (expected {expected})")]
    ConfigurationError {
        param: String,
        value: String,
        expected: String,
    },

    // Remote collaborator errors
    #[error("Remote settings request failed: {reason}")]
    RemoteFailure { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AmbienceError {
    /// Shorthand for a network failure without an underlying source error
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AmbienceError::NetworkFailure {
            url: url.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for a decode failure without an underlying source error
    pub fn decode(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AmbienceError::DecodeFailure {
            name: name.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AmbienceError::NetworkFailure { .. } => "NETWORK_FAILURE",
            AmbienceError::DecodeFailure { .. } => "DECODE_FAILURE",
            AmbienceError::EmptyLibrary => "EMPTY_LIBRARY",
            AmbienceError::UploadFailure { .. } => "UPLOAD_FAILURE",
            AmbienceError::DeviceAcquisitionFailure { .. } => "DEVICE_ACQUISITION_FAILURE",
            AmbienceError::TransformFailure { .. } => "TRANSFORM_FAILURE",
            AmbienceError::InvalidRouting { .. } => "INVALID_ROUTING",
            AmbienceError::GainStageBusy { .. } => "GAIN_STAGE_BUSY",
            AmbienceError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AmbienceError::RemoteFailure { .. } => "REMOTE_FAILURE",
            AmbienceError::Io(_) => "IO_ERROR",
            AmbienceError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AmbienceError::NetworkFailure { .. }
                | AmbienceError::DeviceAcquisitionFailure { .. }
                | AmbienceError::TransformFailure { .. }
                | AmbienceError::UploadFailure { .. }
                | AmbienceError::RemoteFailure { .. }
                | AmbienceError::EmptyLibrary
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AmbienceError::NetworkFailure { .. } => vec![
                "Check that the effect directory is reachable",
                "Verify index.json exists and is a JSON array of filenames",
                "The previously loaded effects are still available",
            ],
            AmbienceError::DecodeFailure { .. } => vec![
                "Re-export the effect as a PCM WAV file",
                "Supported encodings: 16/24/32-bit integer, 32-bit float",
            ],
            AmbienceError::EmptyLibrary => vec![
                "Upload at least one WAV file to the effect directory",
                "Reload the effect library",
            ],
            AmbienceError::DeviceAcquisitionFailure { .. } => vec![
                "Check that the input device is connected",
                "Grant microphone permission to the client",
                "Select a different input or 'none' and reconfigure",
            ],
            AmbienceError::TransformFailure { .. } => vec![
                "Disable advanced noise suppression and reconfigure",
            ],
            AmbienceError::ConfigurationError { .. } => vec![
                "Gains must lie within 0.0 to 1.0",
                "Thresholds are in dB, typically between -80 and 0",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AmbienceError::network("sfx/index.json", "connection refused");
        assert_eq!(err.error_code(), "NETWORK_FAILURE");

        let err = AmbienceError::DeviceAcquisitionFailure {
            selector: "mic-1".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(err.error_code(), "DEVICE_ACQUISITION_FAILURE");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = AmbienceError::DeviceAcquisitionFailure {
            selector: "mic-1".to_string(),
            reason: "busy".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());

        let err = AmbienceError::InvalidRouting {
            reason: "cycle".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AmbienceError::decode("rain.wav", "not a RIFF file");
        assert_eq!(err.to_string(), "Failed to decode rain.wav: not a RIFF file");
    }
}
