use serde::{Deserialize, Serialize};

use crate::DocumentId;

/// Fetch the full plain-text content.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExtractText {
    /// Target session.
    pub document_id: DocumentId,
}

/// Fetch the metadata mapping.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GetMetadata {
    /// Target session.
    pub document_id: DocumentId,
}

/// Locate every occurrence of a term in the extracted text.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SearchText {
    /// Target session.
    pub document_id: DocumentId,

    /// Text to look for. Must not be empty.
    pub term: String,

    /// Match case exactly.
    #[serde(default)]
    pub case_sensitive: bool,

    /// Only match where the term is not part of a longer word.
    #[serde(default)]
    pub whole_word: bool,
}

/// Fetch word, character and page counts.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GetStatistics {
    /// Target session.
    pub document_id: DocumentId,
}

/// Fetch the heading outline.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GetDocumentStructure {
    /// Target session.
    pub document_id: DocumentId,
}

/// Describe the restrictions the service enforces.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GetSecurityInfo;

/// Describe how much of the service's session capacity is in use.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GetStorageInfo;
