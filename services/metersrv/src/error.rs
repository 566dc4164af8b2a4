//! Error handling for the meter reader service

use meter_protocol::ProtocolError;
use thiserror::Error;

/// Meter service error type
#[derive(Error, Debug, Clone)]
pub enum MeterSrvError {
    /// Configuration loading or persistence errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File system errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Serial device open/read errors
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Frame level errors
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// CSV recorder errors
    #[error("Recorder error: {0}")]
    RecorderError(String),

    /// Invalid parameters from callers
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the meter service
pub type Result<T> = std::result::Result<T, MeterSrvError>;

impl MeterSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        MeterSrvError::ConfigError(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        MeterSrvError::DeviceError(msg.into())
    }

    pub fn recorder(msg: impl Into<String>) -> Self {
        MeterSrvError::RecorderError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MeterSrvError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MeterSrvError::InternalError(msg.into())
    }

    /// Whether the caller supplied bad input (maps to HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, MeterSrvError::ValidationError(_))
    }
}

impl From<std::io::Error> for MeterSrvError {
    fn from(err: std::io::Error) -> Self {
        MeterSrvError::IoError(err.to_string())
    }
}

impl From<ProtocolError> for MeterSrvError {
    fn from(err: ProtocolError) -> Self {
        MeterSrvError::ProtocolError(err.to_string())
    }
}

impl From<figment::Error> for MeterSrvError {
    fn from(err: figment::Error) -> Self {
        MeterSrvError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for MeterSrvError {
    fn from(err: serde_yaml::Error) -> Self {
        MeterSrvError::ConfigError(format!("YAML: {err}"))
    }
}

impl From<csv::Error> for MeterSrvError {
    fn from(err: csv::Error) -> Self {
        MeterSrvError::RecorderError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeterSrvError::device("Failed to open /dev/ttyUSB0: No such file");
        assert_eq!(
            err.to_string(),
            "Device error: Failed to open /dev/ttyUSB0: No such file"
        );
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: MeterSrvError = ProtocolError::InvalidLength {
            expected: 14,
            actual: 3,
        }
        .into();
        assert!(matches!(err, MeterSrvError::ProtocolError(_)));
        assert!(!err.is_client_error());
        assert!(MeterSrvError::validation("port required").is_client_error());
    }
}
