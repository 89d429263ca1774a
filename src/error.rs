//! # Error Types
//!
//! Custom error types for Flight Telemetry using `thiserror`.

use thiserror::Error;

/// Main error type for Flight Telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate device paths could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Read or write failure on an open link
    #[error("Transport error: {0}")]
    Transport(String),

    /// Session started outside a tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Operation attempted on a closed session
    #[error("Session is closed")]
    SessionClosed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Flight Telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;
