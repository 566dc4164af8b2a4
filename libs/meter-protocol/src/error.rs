//! Protocol error types

use thiserror::Error;

/// Errors raised when a byte slice cannot be interpreted as a meter frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Slice is not exactly one frame long
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A byte does not carry the positional tag for its slot
    #[error("Tag mismatch at byte {index}: expected {expected:#04X}, got {byte:#04X}")]
    TagMismatch { index: usize, expected: u8, byte: u8 },
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
