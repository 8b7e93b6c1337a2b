//! Error types for micgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MicgateError {
    // Configuration errors, surfaced synchronously at arm/registration time,
    // never deferred to the real-time path
    #[error("Invalid frame format: {message}")]
    InvalidFrameFormat { message: String },

    #[error("Invalid classifier aggressiveness {tier}: must be 0..=3")]
    InvalidAggressiveness { tier: u8 },

    #[error("Invalid session parameter {param}: {message}")]
    InvalidParams { param: String, message: String },

    #[error("Spotter model not found at {path}")]
    SpotterModelNotFound { path: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // External collaborator failures, tagged and isolated per mode
    #[error("Keyword spotter failed: {message}")]
    SpotterFailed { message: String },

    #[error("Recording sink error: {message}")]
    RecordingSink { message: String },

    // Session and channel errors
    #[error("Frame router is closed")]
    RouterClosed,

    #[error("Receive timed out after {timeout_ms} ms")]
    ReceiveTimeout { timeout_ms: u64 },

    #[error("Producer disconnected before end of stream")]
    ProducerDisconnected,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MicgateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_frame_format_display() {
        let error = MicgateError::InvalidFrameFormat {
            message: "frame duration must be a whole number of samples".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame format: frame duration must be a whole number of samples"
        );
    }

    #[test]
    fn test_invalid_aggressiveness_display() {
        let error = MicgateError::InvalidAggressiveness { tier: 7 };
        assert_eq!(
            error.to_string(),
            "Invalid classifier aggressiveness 7: must be 0..=3"
        );
    }

    #[test]
    fn test_invalid_params_display() {
        let error = MicgateError::InvalidParams {
            param: "max_phrase_ms".to_string(),
            message: "must be at least one frame long".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid session parameter max_phrase_ms: must be at least one frame long"
        );
    }

    #[test]
    fn test_spotter_model_not_found_display() {
        let error = MicgateError::SpotterModelNotFound {
            path: "/models/hmm".to_string(),
        };
        assert_eq!(error.to_string(), "Spotter model not found at /models/hmm");
    }

    #[test]
    fn test_audio_device_not_found_display() {
        let error = MicgateError::AudioDeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_audio_capture_display() {
        let error = MicgateError::AudioCapture {
            message: "stream build failed".to_string(),
        };
        assert_eq!(error.to_string(), "Audio capture failed: stream build failed");
    }

    #[test]
    fn test_spotter_failed_display() {
        let error = MicgateError::SpotterFailed {
            message: "decoder returned an error".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Keyword spotter failed: decoder returned an error"
        );
    }

    #[test]
    fn test_recording_sink_display() {
        let error = MicgateError::RecordingSink {
            message: "disk full".to_string(),
        };
        assert_eq!(error.to_string(), "Recording sink error: disk full");
    }

    #[test]
    fn test_receive_timeout_display() {
        let error = MicgateError::ReceiveTimeout { timeout_ms: 3000 };
        assert_eq!(error.to_string(), "Receive timed out after 3000 ms");
    }

    #[test]
    fn test_router_closed_display() {
        assert_eq!(MicgateError::RouterClosed.to_string(), "Frame router is closed");
    }

    #[test]
    fn test_producer_disconnected_display() {
        assert_eq!(
            MicgateError::ProducerDisconnected.to_string(),
            "Producer disconnected before end of stream"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: MicgateError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: MicgateError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: MicgateError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<MicgateError>();
        assert_sync::<MicgateError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);

        fn returns_error() -> Result<i32> {
            Err(MicgateError::RouterClosed)
        }
        assert!(returns_error().is_err());
    }
}
