//! The operation-set interface shared by the network client and every
//! in-process implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::operation::*;
use crate::{
    DocumentId, Metadata, Operation, OutlineEntry, Outcome, Request, SecurityInfo, ServiceError,
    Statistics, StorageInfo, Style, TextMatch,
};

/// Something that can execute document operations.
///
/// Implemented by the RPC client (remote) and by in-process services, so
/// callers and contract tests are written once against this trait.
#[async_trait]
pub trait DocumentService: Send + Sync + 'static {
    /// Error type, able to carry every service-reported failure.
    type Error: std::error::Error + From<ServiceError> + Send + Sync + 'static;

    /// Executes one operation and waits for its result.
    async fn execute(&self, operation: Operation) -> Result<Outcome, Self::Error>;
}

/// Typed calls for every operation, available on any [`DocumentService`].
#[async_trait]
pub trait DocumentServiceExt: DocumentService {
    /// Executes a typed request and extracts its payload.
    ///
    /// # Errors
    ///
    /// Returns the service's error, or a protocol error if the outcome does
    /// not match the request.
    async fn call<R: Request>(&self, request: R) -> Result<R::Response, Self::Error> {
        let operation: Operation = request.into();
        let name = operation.name();
        let outcome = self.execute(operation).await?;
        let kind = outcome.kind();

        R::response(outcome).ok_or_else(|| {
            ServiceError::protocol(format!("unexpected {kind} outcome for {name}")).into()
        })
    }

    /// Starts a new, empty document session.
    async fn create_document(&self) -> Result<DocumentId, Self::Error> {
        self.call(CreateDocument).await
    }

    /// Starts a session on an existing document file.
    async fn open_document(&self, path: impl AsRef<Path> + Send) -> Result<DocumentId, Self::Error> {
        self.call(OpenDocument {
            path: path.as_ref().to_path_buf(),
        })
        .await
    }

    /// Appends a heading at `level` (1 through 9).
    async fn add_heading(
        &self,
        document_id: &DocumentId,
        text: impl Into<String> + Send,
        level: u8,
    ) -> Result<(), Self::Error> {
        self.call(AddHeading {
            document_id: document_id.clone(),
            text: text.into(),
            level,
        })
        .await
    }

    /// Appends a paragraph, optionally styled.
    async fn add_paragraph(
        &self,
        document_id: &DocumentId,
        text: impl Into<String> + Send,
        style: Option<Style>,
    ) -> Result<(), Self::Error> {
        self.call(AddParagraph {
            document_id: document_id.clone(),
            text: text.into(),
            style,
        })
        .await
    }

    /// Appends a table.
    async fn add_table(
        &self,
        document_id: &DocumentId,
        rows: Vec<Vec<String>>,
    ) -> Result<(), Self::Error> {
        self.call(AddTable {
            document_id: document_id.clone(),
            rows,
        })
        .await
    }

    /// Appends a numbered or bulleted list.
    async fn add_list(
        &self,
        document_id: &DocumentId,
        items: Vec<String>,
        ordered: bool,
    ) -> Result<(), Self::Error> {
        self.call(AddList {
            document_id: document_id.clone(),
            items,
            ordered,
        })
        .await
    }

    /// Starts a new page.
    async fn add_page_break(&self, document_id: &DocumentId) -> Result<(), Self::Error> {
        self.call(AddPageBreak {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Replaces the page header.
    async fn set_header(
        &self,
        document_id: &DocumentId,
        text: impl Into<String> + Send,
    ) -> Result<(), Self::Error> {
        self.call(SetHeader {
            document_id: document_id.clone(),
            text: text.into(),
        })
        .await
    }

    /// Replaces the page footer.
    async fn set_footer(
        &self,
        document_id: &DocumentId,
        text: impl Into<String> + Send,
    ) -> Result<(), Self::Error> {
        self.call(SetFooter {
            document_id: document_id.clone(),
            text: text.into(),
        })
        .await
    }

    /// Replaces every occurrence of `find_text`, returning the count.
    async fn find_and_replace(
        &self,
        document_id: &DocumentId,
        find_text: impl Into<String> + Send,
        replace_text: impl Into<String> + Send,
    ) -> Result<usize, Self::Error> {
        self.call(FindAndReplace {
            document_id: document_id.clone(),
            find_text: find_text.into(),
            replace_text: replace_text.into(),
        })
        .await
    }

    /// Fetches the full plain-text content.
    async fn extract_text(&self, document_id: &DocumentId) -> Result<String, Self::Error> {
        self.call(ExtractText {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Fetches the metadata mapping.
    async fn get_metadata(&self, document_id: &DocumentId) -> Result<Metadata, Self::Error> {
        self.call(GetMetadata {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Writes the document to `output_path`.
    async fn save_document(
        &self,
        document_id: &DocumentId,
        output_path: impl AsRef<Path> + Send,
    ) -> Result<(), Self::Error> {
        self.call(SaveDocument {
            document_id: document_id.clone(),
            output_path: output_path.as_ref().to_path_buf(),
        })
        .await
    }

    /// Renders the document to a PDF at `output_path`.
    async fn convert_to_pdf(
        &self,
        document_id: &DocumentId,
        output_path: impl AsRef<Path> + Send,
    ) -> Result<(), Self::Error> {
        self.call(ConvertToPdf {
            document_id: document_id.clone(),
            output_path: output_path.as_ref().to_path_buf(),
        })
        .await
    }

    /// Renders every page into `output_dir`, returning the generated paths.
    async fn convert_to_images(
        &self,
        document_id: &DocumentId,
        output_dir: impl AsRef<Path> + Send,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, Self::Error> {
        self.call(ConvertToImages {
            document_id: document_id.clone(),
            output_dir: output_dir.as_ref().to_path_buf(),
            format,
            dpi,
        })
        .await
    }

    /// Ends a session. The handle is invalid afterwards.
    async fn close_document(&self, document_id: &DocumentId) -> Result<(), Self::Error> {
        self.call(CloseDocument {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Lists metadata for every open session.
    async fn list_documents(&self) -> Result<Vec<Metadata>, Self::Error> {
        self.call(ListDocuments).await
    }

    /// Locates `term` in the extracted text. With `whole_word`, matches
    /// inside longer words are skipped.
    async fn search_text(
        &self,
        document_id: &DocumentId,
        term: impl Into<String> + Send,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Vec<TextMatch>, Self::Error> {
        self.call(SearchText {
            document_id: document_id.clone(),
            term: term.into(),
            case_sensitive,
            whole_word,
        })
        .await
    }

    /// Fetches word, character and page counts.
    async fn get_statistics(&self, document_id: &DocumentId) -> Result<Statistics, Self::Error> {
        self.call(GetStatistics {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Writes the document as Markdown to `output_path`.
    async fn export_to_markdown(
        &self,
        document_id: &DocumentId,
        output_path: impl AsRef<Path> + Send,
    ) -> Result<(), Self::Error> {
        self.call(ExportToMarkdown {
            document_id: document_id.clone(),
            output_path: output_path.as_ref().to_path_buf(),
        })
        .await
    }

    /// Fetches the heading outline.
    async fn get_document_structure(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<OutlineEntry>, Self::Error> {
        self.call(GetDocumentStructure {
            document_id: document_id.clone(),
        })
        .await
    }

    /// Describes the restrictions the service enforces.
    async fn get_security_info(&self) -> Result<SecurityInfo, Self::Error> {
        self.call(GetSecurityInfo).await
    }

    /// Describes how much session capacity is in use.
    async fn get_storage_info(&self) -> Result<StorageInfo, Self::Error> {
        self.call(GetStorageInfo).await
    }
}

impl<S: DocumentService + ?Sized> DocumentServiceExt for S {}
