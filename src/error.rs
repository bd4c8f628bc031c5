//! # Error Types
//!
//! Custom error types for CRSF Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for CRSF Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// CRSF protocol errors
    #[error("CRSF protocol error: {0}")]
    CrsfProtocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or used
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Joystick device errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// No joystick device was found
    #[error("No joystick device found")]
    ControllerNotFound,

    /// The slave node did not answer within the request timeout
    #[error("Slave unreachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    /// The slave node answered with an error
    #[error("Remote error: {0}")]
    Remote(String),

    /// JSON encoding/decoding errors on the bridge wire
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// True when the error means the remote node could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BridgeError::Unreachable { .. })
    }
}

/// Result type alias for CRSF Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
