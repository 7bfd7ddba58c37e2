//! The closed set of operations a document service accepts.
//!
//! Each operation has its own argument struct so required fields are checked
//! at compile time on the caller side and at decode time on the service
//! side. On the wire an operation is adjacently tagged:
//! `{"name": "add_heading", "arguments": {...}}`.

mod content;
mod export;
mod lifecycle;
mod query;

pub use content::*;
pub use export::*;
pub use lifecycle::*;
pub use query::*;

use std::path::Path;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{DocumentId, ServiceError};

/// A request to the document service.
#[derive(Clone, Debug, Deserialize, From, PartialEq, Serialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum Operation {
    /// Start a new, empty document session.
    CreateDocument,

    /// Start a session on an existing document file.
    #[from]
    OpenDocument(OpenDocument),

    /// Append a heading.
    #[from]
    AddHeading(AddHeading),

    /// Append a paragraph.
    #[from]
    AddParagraph(AddParagraph),

    /// Append a table.
    #[from]
    AddTable(AddTable),

    /// Append a list.
    #[from]
    AddList(AddList),

    /// Start a new page.
    #[from]
    AddPageBreak(AddPageBreak),

    /// Replace the page header.
    #[from]
    SetHeader(SetHeader),

    /// Replace the page footer.
    #[from]
    SetFooter(SetFooter),

    /// Replace every occurrence of a string.
    #[from]
    FindAndReplace(FindAndReplace),

    /// Fetch the plain-text content.
    #[from]
    ExtractText(ExtractText),

    /// Fetch the metadata mapping.
    #[from]
    GetMetadata(GetMetadata),

    /// Write the document to a file.
    #[from]
    SaveDocument(SaveDocument),

    /// Render the document to PDF.
    #[from]
    ConvertToPdf(ConvertToPdf),

    /// Render every page to an image.
    #[from]
    ConvertToImages(ConvertToImages),

    /// End a session.
    #[from]
    CloseDocument(CloseDocument),

    /// Enumerate open sessions.
    ListDocuments,

    /// Locate a term in the extracted text.
    #[from]
    SearchText(SearchText),

    /// Fetch word, character and page counts.
    #[from]
    GetStatistics(GetStatistics),

    /// Write the document as Markdown.
    #[from]
    ExportToMarkdown(ExportToMarkdown),

    /// Fetch the heading outline.
    #[from]
    GetDocumentStructure(GetDocumentStructure),

    /// Describe the active restrictions.
    GetSecurityInfo,

    /// Describe session capacity use.
    GetStorageInfo,
}

impl From<CreateDocument> for Operation {
    fn from(_: CreateDocument) -> Self {
        Self::CreateDocument
    }
}

impl From<ListDocuments> for Operation {
    fn from(_: ListDocuments) -> Self {
        Self::ListDocuments
    }
}

impl From<GetSecurityInfo> for Operation {
    fn from(_: GetSecurityInfo) -> Self {
        Self::GetSecurityInfo
    }
}

impl From<GetStorageInfo> for Operation {
    fn from(_: GetStorageInfo) -> Self {
        Self::GetStorageInfo
    }
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateDocument => "create_document",
            Self::OpenDocument(_) => "open_document",
            Self::AddHeading(_) => "add_heading",
            Self::AddParagraph(_) => "add_paragraph",
            Self::AddTable(_) => "add_table",
            Self::AddList(_) => "add_list",
            Self::AddPageBreak(_) => "add_page_break",
            Self::SetHeader(_) => "set_header",
            Self::SetFooter(_) => "set_footer",
            Self::FindAndReplace(_) => "find_and_replace",
            Self::ExtractText(_) => "extract_text",
            Self::GetMetadata(_) => "get_metadata",
            Self::SaveDocument(_) => "save_document",
            Self::ConvertToPdf(_) => "convert_to_pdf",
            Self::ConvertToImages(_) => "convert_to_images",
            Self::CloseDocument(_) => "close_document",
            Self::ListDocuments => "list_documents",
            Self::SearchText(_) => "search_text",
            Self::GetStatistics(_) => "get_statistics",
            Self::ExportToMarkdown(_) => "export_to_markdown",
            Self::GetDocumentStructure(_) => "get_document_structure",
            Self::GetSecurityInfo => "get_security_info",
            Self::GetStorageInfo => "get_storage_info",
        }
    }

    /// Whether the operation changes service state or writes files.
    ///
    /// Non-mutating operations are the only ones a client may safely resend
    /// after losing track of a response; the protocol carries no idempotency
    /// key.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::OpenDocument(_)
                | Self::ExtractText(_)
                | Self::GetMetadata(_)
                | Self::ListDocuments
                | Self::SearchText(_)
                | Self::GetStatistics(_)
                | Self::GetDocumentStructure(_)
                | Self::GetSecurityInfo
                | Self::GetStorageInfo
        )
    }

    /// The session this operation targets, if any.
    #[must_use]
    pub const fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Self::CreateDocument
            | Self::OpenDocument(_)
            | Self::ListDocuments
            | Self::GetSecurityInfo
            | Self::GetStorageInfo => None,
            Self::AddHeading(op) => Some(&op.document_id),
            Self::AddParagraph(op) => Some(&op.document_id),
            Self::AddTable(op) => Some(&op.document_id),
            Self::AddList(op) => Some(&op.document_id),
            Self::AddPageBreak(op) => Some(&op.document_id),
            Self::SetHeader(op) => Some(&op.document_id),
            Self::SetFooter(op) => Some(&op.document_id),
            Self::FindAndReplace(op) => Some(&op.document_id),
            Self::ExtractText(op) => Some(&op.document_id),
            Self::GetMetadata(op) => Some(&op.document_id),
            Self::SaveDocument(op) => Some(&op.document_id),
            Self::ConvertToPdf(op) => Some(&op.document_id),
            Self::ConvertToImages(op) => Some(&op.document_id),
            Self::CloseDocument(op) => Some(&op.document_id),
            Self::SearchText(op) => Some(&op.document_id),
            Self::GetStatistics(op) => Some(&op.document_id),
            Self::ExportToMarkdown(op) => Some(&op.document_id),
            Self::GetDocumentStructure(op) => Some(&op.document_id),
        }
    }

    /// File system paths the operation reads or writes.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::OpenDocument(op) => vec![op.path.as_path()],
            Self::SaveDocument(op) => vec![op.output_path.as_path()],
            Self::ConvertToPdf(op) => vec![op.output_path.as_path()],
            Self::ConvertToImages(op) => vec![op.output_dir.as_path()],
            Self::ExportToMarkdown(op) => vec![op.output_path.as_path()],
            _ => Vec::new(),
        }
    }

    /// Checks argument ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument)
    /// error describing the first offending argument.
    pub fn validate(&self) -> Result<(), ServiceError> {
        match self {
            Self::AddHeading(op)
                if !(MIN_HEADING_LEVEL..=MAX_HEADING_LEVEL).contains(&op.level) =>
            {
                Err(ServiceError::invalid_argument(format!(
                    "heading level {} is outside {MIN_HEADING_LEVEL}..={MAX_HEADING_LEVEL}",
                    op.level
                )))
            }
            Self::FindAndReplace(op) if op.find_text.is_empty() => {
                Err(ServiceError::invalid_argument("find_text must not be empty"))
            }
            Self::SearchText(op) if op.term.is_empty() => {
                Err(ServiceError::invalid_argument("search term must not be empty"))
            }
            Self::ConvertToImages(op) if op.dpi == 0 || op.dpi > MAX_DPI => {
                Err(ServiceError::invalid_argument(format!(
                    "dpi {} is outside 1..={MAX_DPI}",
                    op.dpi
                )))
            }
            _ => match self.paths().into_iter().find(|p| p.as_os_str().is_empty()) {
                Some(_) => Err(ServiceError::invalid_argument(format!(
                    "{} requires a non-empty path",
                    self.name()
                ))),
                None => Ok(()),
            },
        }
    }
}
