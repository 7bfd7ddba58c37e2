use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DocumentId;

/// Successful result payload of an operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// The operation has no payload.
    Done,

    /// A new session was started.
    Created {
        /// Handle for the new session.
        document_id: DocumentId,
    },

    /// Result of a find-and-replace.
    Replaced {
        /// Number of replacements made; may be zero.
        count: usize,
    },

    /// Extracted plain text.
    Text {
        /// Full text in document order.
        text: String,
    },

    /// Metadata for one session.
    Metadata {
        /// The metadata mapping.
        metadata: Metadata,
    },

    /// Metadata for every open session.
    Documents {
        /// One entry per open session.
        documents: Vec<Metadata>,
    },

    /// Files generated by an image conversion.
    Images {
        /// One path per page, in page order.
        paths: Vec<PathBuf>,
    },

    /// Occurrences of a search term.
    Matches {
        /// Matches in text order.
        matches: Vec<TextMatch>,
    },

    /// Counts over the extracted text.
    Statistics {
        /// The counts.
        statistics: Statistics,
    },

    /// Heading outline of a document.
    Structure {
        /// Headings in document order.
        outline: Vec<OutlineEntry>,
    },

    /// Restrictions the service enforces.
    Security {
        /// The active restrictions.
        security: SecurityInfo,
    },

    /// Session capacity use.
    Storage {
        /// Current usage and limits.
        storage: StorageInfo,
    },
}

impl Outcome {
    /// Short name of the payload kind, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Created { .. } => "created",
            Self::Replaced { .. } => "replaced",
            Self::Text { .. } => "text",
            Self::Metadata { .. } => "metadata",
            Self::Documents { .. } => "documents",
            Self::Images { .. } => "images",
            Self::Matches { .. } => "matches",
            Self::Statistics { .. } => "statistics",
            Self::Structure { .. } => "structure",
            Self::Security { .. } => "security",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Descriptive properties of an open document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Metadata {
    /// Session handle.
    pub document_id: DocumentId,

    /// Document title, if one can be determined.
    pub title: Option<String>,

    /// Author, if known.
    pub author: Option<String>,

    /// Subject, if known.
    pub subject: Option<String>,

    /// When the document content was first created.
    pub created_at: DateTime<Utc>,

    /// When the document content last changed.
    pub modified_at: DateTime<Utc>,

    /// Number of pages.
    pub page_count: usize,

    /// Number of whitespace-separated words in the extracted text.
    pub word_count: usize,

    /// File the session was opened from, if any.
    pub source_path: Option<PathBuf>,
}

/// One occurrence of a search term.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TextMatch {
    /// Byte offset of the match in the extracted text.
    pub position: usize,

    /// 1-based line number of the match.
    pub line: usize,

    /// Text surrounding the match.
    pub context: String,
}

/// Counts over the extracted text of a document.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// Whitespace-separated words.
    pub words: usize,

    /// Unicode scalar values.
    pub characters: usize,

    /// Unicode scalar values excluding whitespace.
    pub characters_no_spaces: usize,

    /// Non-empty lines.
    pub paragraphs: usize,

    /// Sentence terminators (`.`, `!`, `?`).
    pub sentences: usize,

    /// Pages.
    pub pages: usize,

    /// Estimated reading time at 200 words per minute, rounded up.
    pub reading_time_minutes: usize,
}

/// One heading in a document outline.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OutlineEntry {
    /// Heading level, 1 through 9.
    pub level: u8,

    /// Heading text.
    pub text: String,

    /// Position of the heading among the document's body blocks.
    pub block: usize,

    /// Body blocks between this heading and the next one.
    pub section_blocks: usize,
}

/// Restrictions a service applies to incoming operations.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityInfo {
    /// Only non-mutating operations (and `close_document`) are accepted.
    pub readonly: bool,

    /// Directory every file path must resolve inside, if any.
    pub sandbox_root: Option<PathBuf>,

    /// When set, the only operations accepted. Sorted.
    pub allowed_operations: Option<Vec<String>>,

    /// Operations always refused. Sorted.
    pub denied_operations: Vec<String>,

    /// Maximum number of simultaneously open sessions.
    pub max_open_documents: usize,

    /// Largest document file `open_document` accepts, in bytes.
    pub max_document_size: u64,
}

/// How much of a service's session capacity is in use.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageInfo {
    /// Sessions currently open.
    pub open_documents: usize,

    /// Maximum number of simultaneously open sessions.
    pub max_open_documents: usize,

    /// Bytes of extracted text held across all open sessions.
    pub text_bytes: usize,
}
