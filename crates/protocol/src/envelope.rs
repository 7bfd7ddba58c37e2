//! Message envelopes for the wire format.

use serde::{Deserialize, Serialize};

use crate::{CorrelationId, Operation, Outcome, ServiceError};

/// Protocol version carried by every request.
pub const PROTOCOL_VERSION: u16 = 1;

/// A request as sent over the transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RequestEnvelope {
    /// Protocol version the caller speaks.
    pub version: u16,

    /// Caller-chosen token echoed in the response.
    pub id: CorrelationId,

    /// The operation and its arguments.
    pub operation: Operation,
}

impl RequestEnvelope {
    /// Wraps an operation with the current protocol version.
    #[must_use]
    pub const fn new(id: CorrelationId, operation: Operation) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            operation,
        }
    }
}

/// Either the payload of a successful operation or the reason it failed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// The operation succeeded.
    Success(Outcome),

    /// The operation failed.
    Failure(ServiceError),
}

impl Reply {
    /// Whether the operation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the service error carried by a failed reply.
    pub fn into_result(self) -> Result<Outcome, ServiceError> {
        match self {
            Self::Success(outcome) => Ok(outcome),
            Self::Failure(error) => Err(error),
        }
    }
}

impl From<Result<Outcome, ServiceError>> for Reply {
    fn from(result: Result<Outcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self::Success(outcome),
            Err(error) => Self::Failure(error),
        }
    }
}

/// A response as sent over the transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    /// Correlation id of the originating request.
    pub id: CorrelationId,

    /// Result of the operation.
    pub reply: Reply,
}

impl ResponseEnvelope {
    /// Builds a response for the request with the given id.
    pub fn new(id: CorrelationId, reply: impl Into<Reply>) -> Self {
        Self {
            id,
            reply: reply.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentId, ExtractText};

    #[test]
    fn test_request_wire_shape() {
        let id = CorrelationId::new();
        let envelope = RequestEnvelope::new(
            id,
            ExtractText {
                document_id: DocumentId::from("doc"),
            }
            .into(),
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["version"], PROTOCOL_VERSION);
        assert_eq!(json["operation"]["name"], "extract_text");
        assert_eq!(json["operation"]["arguments"]["document_id"], "doc");

        let decoded: RequestEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_reply_success_flag() {
        let ok = Reply::from(Ok(Outcome::Done));
        let failed = Reply::from(Err(ServiceError::conversion("renderer crashed")));

        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert_eq!(
            failed.into_result().unwrap_err().message,
            "renderer crashed"
        );
    }
}
