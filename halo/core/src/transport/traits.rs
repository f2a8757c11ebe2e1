//! Transport Traits
//!
//! Shared vocabulary of the control channel: connection identifiers, the
//! transport error type, and the [`ControlHandler`] seam that lets the socket
//! server answer requests without knowing what a mood or a driver is.

use std::fmt;

use crate::messages::{ControlRequest, ControlResponse, WireError};

/// Unique identifier for a connected client
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new random 64-bit connection ID
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 8] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during transport operations
#[derive(Debug)]
pub enum TransportError {
    /// Connection to peer failed
    ConnectionFailed(String),
    /// Connection was closed
    ConnectionClosed,
    /// Message serialization/deserialization error
    SerializationError(String),
    /// IO error from underlying transport
    IoError(std::io::Error),
    /// Transport not in expected state
    InvalidState(String),
    /// Frame checksum mismatch - data corruption detected
    ChecksumMismatch {
        /// Expected checksum value
        expected: u32,
        /// Actual checksum value received
        actual: u32,
    },
    /// Length prefix above the frame limit
    FrameTooLarge {
        /// Claimed payload size
        size: usize,
        /// Allowed maximum
        max: usize,
    },
}

impl TransportError {
    /// True when the stream can keep going after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::SerializationError(_)
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            Self::IoError(e) => write!(f, "IO error: {e}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "Checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
            Self::FrameTooLarge { size, max } => {
                write!(f, "Frame size {size} exceeds maximum {max}")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

/// Server-side request processing
///
/// Implementations must be quick: the socket server calls them inline on the
/// connection task.
pub trait ControlHandler: Send + Sync + 'static {
    /// Answer a well-formed request
    fn handle(&self, request: ControlRequest) -> ControlResponse;

    /// Build the reply for a request that could not be served
    fn reject(&self, error: WireError) -> ControlResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_format() {
        let id = ConnectionId::new();
        assert!(id.0.starts_with("conn_"));
        assert_eq!(id.0.len(), "conn_".len() + 16);
        assert_ne!(id, ConnectionId::new());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TransportError::SerializationError("x".into()).is_recoverable());
        assert!(TransportError::ChecksumMismatch {
            expected: 1,
            actual: 2
        }
        .is_recoverable());
        assert!(!TransportError::FrameTooLarge { size: 1, max: 0 }.is_recoverable());
        assert!(!TransportError::ConnectionClosed.is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = TransportError::ChecksumMismatch {
            expected: 0xDEAD_BEEF,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0xdeadbeef, got 0x00000001"
        );
    }
}
