//! Operation scripts.
//!
//! A script is a JSON array of operations in wire form:
//!
//! ```json
//! [
//!   {"name": "create_document"},
//!   {"name": "add_heading", "arguments": {"document_id": "$document_id", "text": "Title", "level": 1}},
//!   {"name": "save_document", "arguments": {"document_id": "$document_id", "output_path": "/tmp/out.docx"}}
//! ]
//! ```
//!
//! `"$document_id"` stands for the handle most recently returned by
//! `create_document` or `open_document`. Every handle a script opens is
//! closed before it returns, whether or not the script succeeds.

use std::io::Write;
use std::path::Path;

use docflow_protocol::{DocumentId, DocumentService, DocumentServiceExt, Operation, Outcome};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Error;

/// Placeholder replaced by the current document handle.
pub const DOCUMENT_ID_PLACEHOLDER: &str = "$document_id";

/// Parses one operation from its name and JSON arguments.
///
/// # Errors
///
/// Returns [`Error::InvalidOperation`] for unknown names or bad arguments.
pub fn parse_operation(name: &str, arguments: Option<Value>) -> Result<Operation, Error> {
    let mut wire = serde_json::Map::new();
    wire.insert("name".to_string(), Value::String(name.to_string()));
    if let Some(arguments) = arguments {
        wire.insert("arguments".to_string(), arguments);
    }

    serde_json::from_value(Value::Object(wire)).map_err(Error::InvalidOperation)
}

/// Reads a script file into its steps.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a JSON array.
pub fn load(path: &Path) -> Result<Vec<Value>, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ScriptIo {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| Error::ScriptFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces every `"$document_id"` string in `value`. Returns whether any
/// placeholder was found.
fn substitute(value: &mut Value, document_id: Option<&DocumentId>) -> Result<bool, ()> {
    match value {
        Value::String(text) if text == DOCUMENT_ID_PLACEHOLDER => {
            let document_id = document_id.ok_or(())?;
            *text = document_id.to_string();
            Ok(true)
        }
        Value::Array(items) => items.iter_mut().try_fold(false, |found, item| {
            Ok(substitute(item, document_id)? || found)
        }),
        Value::Object(map) => map.values_mut().try_fold(false, |found, item| {
            Ok(substitute(item, document_id)? || found)
        }),
        _ => Ok(false),
    }
}

/// Runs `steps` in order against `service`, writing each outcome to `out`
/// as one line of JSON.
///
/// Stops at the first failing step. Handles opened by the script and not
/// closed by it are closed before returning.
///
/// # Errors
///
/// Returns the first failing step, wrapped in [`Error::Step`].
pub async fn run<S>(service: &S, steps: Vec<Value>, out: &mut impl Write) -> Result<usize, Error>
where
    S: DocumentService,
    Error: From<S::Error>,
{
    let mut opened = Vec::new();
    let result = run_steps(service, steps, out, &mut opened).await;

    for document_id in opened {
        match service.close_document(&document_id).await {
            Ok(()) => debug!("Closed leftover document {}", document_id),
            Err(e) => warn!("Failed to close document {}: {}", document_id, e),
        }
    }

    result
}

async fn run_steps<S>(
    service: &S,
    steps: Vec<Value>,
    out: &mut impl Write,
    opened: &mut Vec<DocumentId>,
) -> Result<usize, Error>
where
    S: DocumentService,
    Error: From<S::Error>,
{
    let total = steps.len();
    let mut current: Option<DocumentId> = None;

    for (index, mut step) in steps.into_iter().enumerate() {
        let number = index + 1;
        if substitute(&mut step, current.as_ref()).map_err(|()| Error::NoDocument(number))? {
            debug!("Step {} targets the current document", number);
        }

        let operation: Operation = serde_json::from_value(step).map_err(|e| Error::Step {
            step: number,
            operation: "unknown",
            source: Box::new(Error::InvalidOperation(e)),
        })?;
        let name = operation.name();
        let closing = match &operation {
            Operation::CloseDocument(op) => Some(op.document_id.clone()),
            _ => None,
        };

        debug!("Step {}/{}: {}", number, total, name);
        let outcome = service.execute(operation).await.map_err(|e| Error::Step {
            step: number,
            operation: name,
            source: Box::new(e.into()),
        })?;

        if let Outcome::Created { document_id } = &outcome {
            opened.push(document_id.clone());
            current = Some(document_id.clone());
        }
        if let Some(closed) = closing {
            opened.retain(|document_id| *document_id != closed);
        }

        serde_json::to_writer(&mut *out, &outcome).map_err(std::io::Error::from)?;
        writeln!(out)?;
    }

    info!("Script finished: {} steps", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use docflow_protocol::ErrorKind;
    use docflow_service_memory::MemoryService;
    use serde_json::json;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn test_parse_operation() {
        let op = parse_operation("create_document", None).unwrap();
        assert_eq!(op, Operation::CreateDocument);

        let op = parse_operation(
            "add_heading",
            Some(json!({"document_id": "doc", "text": "Title", "level": 2})),
        )
        .unwrap();
        assert_eq!(op.name(), "add_heading");

        assert!(matches!(
            parse_operation("rotate_page", None),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            parse_operation("add_heading", Some(json!({"document_id": "doc"}))),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_substitute_nested_placeholders() {
        let id = DocumentId::from("abc");
        let mut value = json!({
            "name": "add_table",
            "arguments": {"document_id": "$document_id", "rows": [["$document_id", "x"]]}
        });

        assert_eq!(substitute(&mut value, Some(&id)), Ok(true));
        assert_eq!(value["arguments"]["document_id"], "abc");
        assert_eq!(value["arguments"]["rows"][0][0], "abc");

        let mut untouched = json!({"name": "list_documents"});
        assert_eq!(substitute(&mut untouched, None), Ok(false));

        let mut missing = json!({"arguments": {"document_id": "$document_id"}});
        assert_eq!(substitute(&mut missing, None), Err(()));
    }

    #[tokio::test]
    async fn test_script_runs_in_order() {
        let service = MemoryService::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.docx");
        let steps = vec![
            json!({"name": "create_document"}),
            json!({"name": "add_heading", "arguments": {"document_id": "$document_id", "text": "Title", "level": 1}}),
            json!({"name": "add_table", "arguments": {"document_id": "$document_id", "rows": [["A", "B"], ["1", "2"]]}}),
            json!({"name": "save_document", "arguments": {"document_id": "$document_id", "output_path": path}}),
            json!({"name": "extract_text", "arguments": {"document_id": "$document_id"}}),
        ];
        let mut out = Vec::new();

        let count = run(&service, steps, &mut out).await.unwrap();

        assert_eq!(count, 5);
        assert!(path.exists());
        assert_eq!(service.open_documents(), 0);

        let lines = String::from_utf8(out).unwrap();
        let outcomes: Vec<Outcome> = lines
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert!(matches!(outcomes[0], Outcome::Created { .. }));
        assert_eq!(
            outcomes[4],
            Outcome::Text {
                text: "Title\nA\tB\n1\t2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_step_still_closes_documents() {
        let service = MemoryService::new();
        let steps = vec![
            json!({"name": "create_document"}),
            json!({"name": "create_document"}),
            json!({"name": "add_heading", "arguments": {"document_id": "$document_id", "text": "Bad", "level": 12}}),
            json!({"name": "list_documents"}),
        ];

        let err = run(&service, steps, &mut Vec::new()).await.unwrap_err();

        let (step, operation, source) = match err {
            Error::Step {
                step,
                operation,
                source,
            } => (step, operation, source),
            other => panic!("expected a step error, got {other:?}"),
        };
        assert_eq!((step, operation), (3, "add_heading"));
        assert!(
            matches!(*source, Error::Service(ref e) if e.kind == ErrorKind::InvalidArgument)
        );
        assert_eq!(service.open_documents(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_explicit_close_is_not_repeated() {
        let service = MemoryService::new();
        let steps = vec![
            json!({"name": "create_document"}),
            json!({"name": "close_document", "arguments": {"document_id": "$document_id"}}),
        ];

        run(&service, steps, &mut Vec::new()).await.unwrap();

        assert_eq!(service.open_documents(), 0);
        assert!(!logs_contain("Failed to close document"));
    }

    #[tokio::test]
    async fn test_placeholder_without_document() {
        let service = MemoryService::new();
        let steps = vec![json!({"name": "extract_text", "arguments": {"document_id": "$document_id"}})];

        assert!(matches!(
            run(&service, steps, &mut Vec::new()).await,
            Err(Error::NoDocument(1))
        ));
    }

    #[test]
    fn test_load_rejects_non_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, r#"{"name": "create_document"}"#).unwrap();

        assert!(matches!(load(&path), Err(Error::ScriptFormat { .. })));
        assert!(matches!(
            load(&dir.path().join("absent.json")),
            Err(Error::ScriptIo { .. })
        ));
    }
}
