//! Byte-I/O provider error types.
//!
//! Kept separate from [`crate::VcpError`] so backends stay independent of the
//! engine; the engine folds these into its port error class.

use thiserror::Error;

/// Errors that can occur inside a byte-I/O backend.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial device was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during a transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// `open` was called on a link that is already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// The link has not been opened.
    #[error("Port is not open")]
    NotOpen,

    /// The transceiver refused a direction change.
    #[error("Direction control failed: {0}")]
    Direction(String),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a device path.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration)
    }
}
