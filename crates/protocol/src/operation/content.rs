use serde::{Deserialize, Serialize};

use crate::{DocumentId, Style};

/// Lowest accepted heading level.
pub const MIN_HEADING_LEVEL: u8 = 1;

/// Highest accepted heading level.
pub const MAX_HEADING_LEVEL: u8 = 9;

/// Append a heading.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AddHeading {
    /// Target session.
    pub document_id: DocumentId,

    /// Heading text.
    pub text: String,

    /// Outline level, 1 through 9.
    pub level: u8,
}

/// Append a paragraph, optionally styled.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AddParagraph {
    /// Target session.
    pub document_id: DocumentId,

    /// Paragraph text.
    pub text: String,

    /// Formatting overrides for this paragraph only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
}

/// Append a table. Rows may be ragged.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AddTable {
    /// Target session.
    pub document_id: DocumentId,

    /// Rows of cell text, in order.
    pub rows: Vec<Vec<String>>,
}

/// Append a numbered or bulleted list.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AddList {
    /// Target session.
    pub document_id: DocumentId,

    /// List items, in order.
    pub items: Vec<String>,

    /// Numbered when `true`, bulleted otherwise.
    #[serde(default)]
    pub ordered: bool,
}

/// Start a new page.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AddPageBreak {
    /// Target session.
    pub document_id: DocumentId,
}

/// Replace the page header text.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SetHeader {
    /// Target session.
    pub document_id: DocumentId,

    /// Header text.
    pub text: String,
}

/// Replace the page footer text.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SetFooter {
    /// Target session.
    pub document_id: DocumentId,

    /// Footer text.
    pub text: String,
}

/// Replace every occurrence of a string.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FindAndReplace {
    /// Target session.
    pub document_id: DocumentId,

    /// Text to look for. Must not be empty.
    pub find_text: String,

    /// Replacement text.
    pub replace_text: String,
}
