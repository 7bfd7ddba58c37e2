//! Error taxonomy shared by every side of the protocol.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DocumentId;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Category of a failure reported by a document service.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced session does not exist or is already closed.
    InvalidHandle,

    /// Malformed or out-of-range input.
    InvalidArgument,

    /// Unreadable source file or unwritable destination path.
    Io,

    /// The rendering/export step failed.
    Conversion,

    /// A service-side limit was reached.
    ResourceExhausted,

    /// The service policy forbids the operation or path.
    PermissionDenied,

    /// The two sides disagree about the protocol itself.
    Protocol,

    /// Unexpected failure inside the service.
    Internal,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry after remediating the cause.
    ///
    /// Invalid-handle, argument and policy errors will fail the same way
    /// again, so they are never retryable.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Io | Self::Conversion | Self::ResourceExhausted)
    }

    /// Stable wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidHandle => "invalid_handle",
            Self::InvalidArgument => "invalid_argument",
            Self::Io => "io",
            Self::Conversion => "conversion",
            Self::ResourceExhausted => "resource_exhausted",
            Self::PermissionDenied => "permission_denied",
            Self::Protocol => "protocol",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by a document service in response to one request.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    /// Category of the failure.
    pub kind: ErrorKind,

    /// Human-readable description.
    pub message: String,
}

impl ServiceError {
    /// Creates an error of the given category.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The handle names no open session.
    #[must_use]
    pub fn invalid_handle(document_id: &DocumentId) -> Self {
        Self::new(
            ErrorKind::InvalidHandle,
            format!("document not found or already closed: {document_id}"),
        )
    }

    /// Malformed or out-of-range input.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// A file system failure on `path`.
    pub fn io(path: &Path, source: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Io, format!("{}: {source}", path.display()))
    }

    /// The conversion engine failed with `reason`.
    pub fn conversion(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, reason)
    }

    /// A service-side limit was reached.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    /// The service policy forbids the request.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// The peers disagree about the protocol.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Unexpected failure inside the service.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether the caller may retry after remediation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(ErrorKind::Io.is_retryable());
        assert!(ErrorKind::Conversion.is_retryable());
        assert!(ErrorKind::ResourceExhausted.is_retryable());
        assert!(!ErrorKind::InvalidHandle.is_retryable());
        assert!(!ErrorKind::InvalidArgument.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = ServiceError::invalid_argument("heading level 12 is outside 1..=9");
        assert_eq!(
            err.to_string(),
            "invalid_argument: heading level 12 is outside 1..=9"
        );
    }

    #[test]
    fn test_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&ErrorKind::ResourceExhausted).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorKind::ResourceExhausted.as_str()));
    }
}
