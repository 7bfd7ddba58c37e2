//! CBOR payload encoding for request and response envelopes.

use bytes::Bytes;
use docflow_protocol::{
    CorrelationId, Operation, PROTOCOL_VERSION, RequestEnvelope, ResponseEnvelope, ServiceError,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CodecError, Result};

/// Encode a message into CBOR bytes.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes> {
    let mut vec = Vec::new();
    ciborium::ser::into_writer(msg, &mut vec).map_err(CodecError::from)?;
    Ok(Bytes::from(vec))
}

/// Decode CBOR bytes into a message.
///
/// # Errors
///
/// Returns an error if the data is invalid or the message cannot be deserialized.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::de::from_reader(data)
        .map_err(CodecError::from)
        .map_err(Into::into)
}

/// A request envelope whose operation has not been interpreted yet.
#[derive(Deserialize)]
struct RawRequest {
    version: u16,
    id: CorrelationId,
    operation: ciborium::Value,
}

/// A request as seen by the server after decoding.
#[derive(Debug)]
pub enum IncomingRequest {
    /// A well-formed request for this protocol version.
    Valid(RequestEnvelope),

    /// The envelope carried an id but could not be accepted; the error is
    /// sent back under that id.
    Rejected {
        /// Correlation id of the rejected request.
        id: CorrelationId,
        /// Why the request was rejected.
        error: ServiceError,
    },
}

/// Decode a request payload in two passes.
///
/// The envelope is read first so the correlation id is known even when the
/// operation itself is malformed; such requests come back as
/// [`IncomingRequest::Rejected`] rather than an error.
///
/// # Errors
///
/// Returns an error only if no correlation id can be recovered.
pub fn decode_request(data: &[u8]) -> Result<IncomingRequest> {
    let raw: RawRequest = decode(data)?;

    if raw.version != PROTOCOL_VERSION {
        return Ok(IncomingRequest::Rejected {
            id: raw.id,
            error: ServiceError::protocol(format!(
                "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                raw.version
            )),
        });
    }

    match raw.operation.deserialized::<Operation>() {
        Ok(operation) => Ok(IncomingRequest::Valid(RequestEnvelope {
            version: raw.version,
            id: raw.id,
            operation,
        })),
        Err(e) => Ok(IncomingRequest::Rejected {
            id: raw.id,
            error: ServiceError::invalid_argument(format!("malformed operation: {e}")),
        }),
    }
}

/// Decode a response payload.
///
/// # Errors
///
/// Returns an error if the payload is not a response envelope.
pub fn decode_response(data: &[u8]) -> Result<ResponseEnvelope> {
    decode(data)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use docflow_protocol::{
        AddHeading, DocumentId, ErrorKind, GetDocumentStructure, OutlineEntry, Outcome, Reply,
        SearchText, SecurityInfo, StorageInfo,
    };

    use super::*;

    #[derive(Serialize)]
    struct LooseRequest<'a> {
        version: u16,
        id: CorrelationId,
        operation: LooseOperation<'a>,
    }

    #[derive(Serialize)]
    struct LooseOperation<'a> {
        name: &'a str,
        arguments: Vec<(&'a str, &'a str)>,
    }

    #[test]
    fn test_request_decodes() {
        let envelope = RequestEnvelope::new(
            CorrelationId::new(),
            AddHeading {
                document_id: DocumentId::from("doc"),
                text: "Title".to_string(),
                level: 1,
            }
            .into(),
        );

        let bytes = encode(&envelope).unwrap();
        let IncomingRequest::Valid(decoded) = decode_request(&bytes).unwrap() else {
            panic!("expected a valid request");
        };
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_malformed_operation_keeps_id() {
        let id = CorrelationId::new();
        let bytes = encode(&LooseRequest {
            version: PROTOCOL_VERSION,
            id,
            operation: LooseOperation {
                name: "rotate_document",
                arguments: vec![("document_id", "doc")],
            },
        })
        .unwrap();

        let IncomingRequest::Rejected { id: rejected, error } = decode_request(&bytes).unwrap()
        else {
            panic!("expected a rejection");
        };
        assert_eq!(rejected, id);
        assert_eq!(error.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = RequestEnvelope::new(CorrelationId::new(), Operation::ListDocuments);
        envelope.version = PROTOCOL_VERSION + 1;

        let bytes = encode(&envelope).unwrap();
        let IncomingRequest::Rejected { error, .. } = decode_request(&bytes).unwrap() else {
            panic!("expected a rejection");
        };
        assert_eq!(error.kind, ErrorKind::Protocol);
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(decode_request(&[0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_response_decodes() {
        let response = ResponseEnvelope::new(
            CorrelationId::new(),
            Reply::Success(Outcome::Replaced { count: 2 }),
        );

        let bytes = encode(&response).unwrap();
        assert_eq!(decode_response(&bytes).unwrap(), response);
    }

    #[test]
    fn test_query_operations_survive_the_wire() {
        let operations = [
            Operation::from(SearchText {
                document_id: DocumentId::from("doc"),
                term: "report".to_string(),
                case_sensitive: false,
                whole_word: true,
            }),
            Operation::from(GetDocumentStructure {
                document_id: DocumentId::from("doc"),
            }),
            Operation::GetSecurityInfo,
            Operation::GetStorageInfo,
        ];

        for operation in operations {
            let envelope = RequestEnvelope::new(CorrelationId::new(), operation);
            let IncomingRequest::Valid(decoded) = decode_request(&encode(&envelope).unwrap()).unwrap()
            else {
                panic!("expected a valid request");
            };
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn test_query_outcomes_survive_the_wire() {
        let outcomes = [
            Outcome::Structure {
                outline: vec![OutlineEntry {
                    level: 2,
                    text: "Background".to_string(),
                    block: 3,
                    section_blocks: 2,
                }],
            },
            Outcome::Security {
                security: SecurityInfo {
                    readonly: true,
                    sandbox_root: Some(PathBuf::from("/srv/docs")),
                    allowed_operations: Some(vec!["extract_text".to_string()]),
                    denied_operations: vec!["save_document".to_string()],
                    max_open_documents: 5,
                    max_document_size: 1024,
                },
            },
            Outcome::Storage {
                storage: StorageInfo {
                    open_documents: 1,
                    max_open_documents: 5,
                    text_bytes: 42,
                },
            },
        ];

        for outcome in outcomes {
            let response = ResponseEnvelope::new(CorrelationId::new(), Reply::Success(outcome));
            assert_eq!(decode_response(&encode(&response).unwrap()).unwrap(), response);
        }
    }
}
