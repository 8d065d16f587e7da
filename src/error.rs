//! Engine-level error taxonomy.
//!
//! Socket, session and engine operations all report a [`VcpError`] to their
//! immediate caller. The worker thread never propagates these outward; it
//! converts them into the error event and runs its recovery action.

use crate::port::PortError;
use crate::session::Direction;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the VCP engine, its sessions and sockets.
#[derive(Debug, Error)]
pub enum VcpError {
    /// Null-equivalent, zero-size or otherwise malformed input.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(&'static str),

    /// The operation does not match the socket's fixed direction.
    #[error("Direction mismatch: socket is {actual}, operation requires {expected}")]
    DirectionMismatch {
        expected: Direction,
        actual: Direction,
    },

    /// The engine has not been initialised, or has already been torn down.
    #[error("VCP engine is not initialized")]
    NotInitialized,

    /// The hardware link or an underlying buffer primitive failed.
    #[error("Port error: {0}")]
    Port(String),

    /// A bounded wait expired without completing.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Every slot of the session table is in use.
    #[error("Session table is full ({capacity} slots)")]
    SlotExhausted { capacity: usize },

    /// A non-blocking read found nothing to return.
    #[error("No data available")]
    Empty,

    /// The (owner, direction) key already names a live session.
    #[error("Session is already open for this owner ({0})")]
    AlreadyOpen(Direction),

    /// The socket's session has been closed.
    #[error("Session has been closed")]
    SessionClosed,
}

impl VcpError {
    /// Create a Port error from a message.
    pub fn port(message: impl Into<String>) -> Self {
        Self::Port(message.into())
    }

    /// True for the timeout class of failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<PortError> for VcpError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Timeout(d) => VcpError::Timeout(d),
            other => VcpError::Port(other.to_string()),
        }
    }
}

/// Result type for engine, session and socket operations.
pub type VcpResult<T> = Result<T, VcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VcpError::SlotExhausted { capacity: 6 };
        assert_eq!(err.to_string(), "Session table is full (6 slots)");

        let err = VcpError::DirectionMismatch {
            expected: Direction::Read,
            actual: Direction::Write,
        };
        assert_eq!(
            err.to_string(),
            "Direction mismatch: socket is write, operation requires read"
        );
    }

    #[test]
    fn test_port_error_conversion() {
        let err: VcpError = PortError::NotOpen.into();
        assert!(matches!(err, VcpError::Port(msg) if msg.contains("not open")));

        let err: VcpError = PortError::timeout(Duration::from_millis(20)).into();
        assert!(err.is_timeout());
    }
}
