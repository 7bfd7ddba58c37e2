//! Error types for the RPC transport.

use std::io;
use std::time::Duration;

use docflow_protocol::{CorrelationId, ErrorKind, ServiceError};
use thiserror::Error;

use crate::protocol::FrameType;

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RPC operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-related errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Protocol-level errors.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec errors during serialization/deserialization.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The service answered and reported a failure.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// No response arrived in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Channel closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,
}

impl Error {
    /// Whether the request got no answer at all, as opposed to an answer
    /// saying no.
    ///
    /// Only transport failures leave the outcome of a request unknown.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Io(_) | Self::ChannelClosed
        )
    }

    /// The service-reported error, if this is one.
    #[must_use]
    pub const fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(error) => Some(error),
            _ => None,
        }
    }

    /// Error category as seen by protocol callers.
    ///
    /// Transport failures are reported as I/O, frame and codec failures as
    /// protocol errors.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(error) => error.kind,
            Self::Protocol(_) | Self::Codec(_) => ErrorKind::Protocol,
            Self::Connection(_) | Self::Timeout(_) | Self::Io(_) | Self::ChannelClosed => {
                ErrorKind::Io
            }
        }
    }
}

/// Connection-specific errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish connection.
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// The address we tried to connect to.
        addr: std::net::SocketAddr,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    Closed,

    /// The client was shut down.
    #[error("Connection is shutting down")]
    ShuttingDown,
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Invalid frame received.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame too large.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame type not valid in this direction.
    #[error("Unexpected frame type: {0:?}")]
    UnexpectedFrame(FrameType),

    /// Checksum mismatch.
    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// A request with this correlation id is already in flight.
    #[error("Request {0} is already in flight")]
    DuplicateId(CorrelationId),
}

/// Codec-related errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Failed to serialize: {0}")]
    SerializationFailed(String),

    /// Deserialization failed.
    #[error("Failed to deserialize: {0}")]
    DeserializationFailed(String),
}

impl From<ciborium::de::Error<io::Error>> for CodecError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        Self::DeserializationFailed(err.to_string())
    }
}

impl From<ciborium::ser::Error<io::Error>> for CodecError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_transport());
        assert!(Error::Connection(ConnectionError::Closed).is_transport());
        assert!(!Error::Service(ServiceError::invalid_argument("bad")).is_transport());
        assert!(!Error::Codec(CodecError::DeserializationFailed("eof".into())).is_transport());
    }

    #[test]
    fn test_kind_passthrough() {
        let error = Error::from(ServiceError::conversion("renderer crashed"));
        assert_eq!(error.kind(), ErrorKind::Conversion);
        assert_eq!(error.service_error().unwrap().message, "renderer crashed");
        assert_eq!(Error::ChannelClosed.kind(), ErrorKind::Io);
    }
}
