use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::DocumentId;

/// Start a new, empty document session.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateDocument;

/// Start a session on an existing document file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OpenDocument {
    /// File to read.
    pub path: PathBuf,
}

/// Write the current in-memory state of a document to a file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SaveDocument {
    /// Session to save.
    pub document_id: DocumentId,

    /// Destination file. Its directory must already exist.
    pub output_path: PathBuf,
}

/// End a session and release its service-side resources.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CloseDocument {
    /// Session to close.
    pub document_id: DocumentId,
}

/// Enumerate every open session.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ListDocuments;
