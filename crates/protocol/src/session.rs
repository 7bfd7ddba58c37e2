//! Scoped document sessions.
//!
//! A session handle must be released with `close_document` on every exit
//! path, including failures. [`Session`] owns that obligation: it closes on
//! [`Session::close`], on every exit of [`Session::run`], and schedules a
//! best-effort close when dropped while still open.

use std::future::Future;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::operation::ImageFormat;
use crate::{
    DocumentId, DocumentService, DocumentServiceExt, Metadata, OutlineEntry, Statistics, Style,
    TextMatch,
};

/// A non-owning reference to an open session.
///
/// Cloning a handle does not extend the session; whoever created the
/// [`Session`] decides when it ends.
#[derive(Clone, Debug)]
pub struct DocumentHandle<S> {
    service: S,
    document_id: DocumentId,
}

impl<S> DocumentHandle<S>
where
    S: DocumentService + Clone,
{
    /// Wraps an existing session handle.
    pub const fn new(service: S, document_id: DocumentId) -> Self {
        Self {
            service,
            document_id,
        }
    }

    /// The session handle.
    pub const fn id(&self) -> &DocumentId {
        &self.document_id
    }

    /// The service the session lives on.
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Appends a heading.
    ///
    /// # Errors
    ///
    /// Fails on an invalid level or a closed session.
    pub async fn add_heading(&self, text: impl Into<String> + Send, level: u8) -> Result<(), S::Error> {
        self.service.add_heading(&self.document_id, text, level).await
    }

    /// Appends a paragraph.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn add_paragraph(
        &self,
        text: impl Into<String> + Send,
        style: Option<Style>,
    ) -> Result<(), S::Error> {
        self.service
            .add_paragraph(&self.document_id, text, style)
            .await
    }

    /// Appends a table.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn add_table(&self, rows: Vec<Vec<String>>) -> Result<(), S::Error> {
        self.service.add_table(&self.document_id, rows).await
    }

    /// Appends a list.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn add_list(&self, items: Vec<String>, ordered: bool) -> Result<(), S::Error> {
        self.service.add_list(&self.document_id, items, ordered).await
    }

    /// Starts a new page.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn add_page_break(&self) -> Result<(), S::Error> {
        self.service.add_page_break(&self.document_id).await
    }

    /// Replaces the header.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn set_header(&self, text: impl Into<String> + Send) -> Result<(), S::Error> {
        self.service.set_header(&self.document_id, text).await
    }

    /// Replaces the footer.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn set_footer(&self, text: impl Into<String> + Send) -> Result<(), S::Error> {
        self.service.set_footer(&self.document_id, text).await
    }

    /// Replaces every occurrence of `find_text`.
    ///
    /// # Errors
    ///
    /// Fails on an empty `find_text` or a closed session.
    pub async fn find_and_replace(
        &self,
        find_text: impl Into<String> + Send,
        replace_text: impl Into<String> + Send,
    ) -> Result<usize, S::Error> {
        self.service
            .find_and_replace(&self.document_id, find_text, replace_text)
            .await
    }

    /// Fetches the plain text.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn extract_text(&self) -> Result<String, S::Error> {
        self.service.extract_text(&self.document_id).await
    }

    /// Fetches the metadata.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn metadata(&self) -> Result<Metadata, S::Error> {
        self.service.get_metadata(&self.document_id).await
    }

    /// Writes the document to `output_path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub async fn save(&self, output_path: impl AsRef<Path> + Send) -> Result<(), S::Error> {
        self.service
            .save_document(&self.document_id, output_path)
            .await
    }

    /// Renders a PDF to `output_path`.
    ///
    /// # Errors
    ///
    /// Fails if rendering or writing fails.
    pub async fn convert_to_pdf(&self, output_path: impl AsRef<Path> + Send) -> Result<(), S::Error> {
        self.service
            .convert_to_pdf(&self.document_id, output_path)
            .await
    }

    /// Renders one image per page into `output_dir`.
    ///
    /// # Errors
    ///
    /// Fails if rendering or writing fails.
    pub async fn convert_to_images(
        &self,
        output_dir: impl AsRef<Path> + Send,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, S::Error> {
        self.service
            .convert_to_images(&self.document_id, output_dir, format, dpi)
            .await
    }

    /// Finds `term` in the extracted text.
    ///
    /// # Errors
    ///
    /// Fails on an empty term or a closed session.
    pub async fn search_text(
        &self,
        term: impl Into<String> + Send,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Vec<TextMatch>, S::Error> {
        self.service
            .search_text(&self.document_id, term, case_sensitive, whole_word)
            .await
    }

    /// Fetches the heading outline.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn structure(&self) -> Result<Vec<OutlineEntry>, S::Error> {
        self.service.get_document_structure(&self.document_id).await
    }

    /// Fetches word and page counts.
    ///
    /// # Errors
    ///
    /// Fails on a closed session.
    pub async fn statistics(&self) -> Result<Statistics, S::Error> {
        self.service.get_statistics(&self.document_id).await
    }

    /// Writes Markdown to `output_path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub async fn export_to_markdown(
        &self,
        output_path: impl AsRef<Path> + Send,
    ) -> Result<(), S::Error> {
        self.service
            .export_to_markdown(&self.document_id, output_path)
            .await
    }
}

/// An open session that is closed exactly once.
#[derive(Debug)]
pub struct Session<S>
where
    S: DocumentService + Clone,
{
    handle: DocumentHandle<S>,
    closed: bool,
}

impl<S> Session<S>
where
    S: DocumentService + Clone,
{
    /// Creates a new, empty document.
    ///
    /// # Errors
    ///
    /// Fails if the service cannot start a session.
    pub async fn create(service: S) -> Result<Self, S::Error> {
        let document_id = service.create_document().await?;
        Ok(Self::adopt(service, document_id))
    }

    /// Opens an existing document.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or unreadable.
    pub async fn open(service: S, path: impl AsRef<Path> + Send) -> Result<Self, S::Error> {
        let document_id = service.open_document(path).await?;
        Ok(Self::adopt(service, document_id))
    }

    /// Takes over closing an already-open handle.
    pub const fn adopt(service: S, document_id: DocumentId) -> Self {
        Self {
            handle: DocumentHandle::new(service, document_id),
            closed: false,
        }
    }

    /// A cloneable reference to this session.
    pub fn handle(&self) -> DocumentHandle<S> {
        self.handle.clone()
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns the service's close error. The session is considered closed
    /// either way.
    pub async fn close(mut self) -> Result<(), S::Error> {
        let result = self
            .handle
            .service
            .close_document(&self.handle.document_id)
            .await;
        self.closed = true;
        result
    }

    /// Runs `body` against the session, then closes it.
    ///
    /// The session is closed whether or not `body` succeeds. If both fail,
    /// the body's error is returned.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the close error if only closing failed.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T, S::Error>
    where
        F: FnOnce(DocumentHandle<S>) -> Fut + Send,
        Fut: Future<Output = Result<T, S::Error>> + Send,
        T: Send,
    {
        let document_id = self.handle.document_id.clone();
        let result = body(self.handle()).await;
        let closed = self.close().await;

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_error)) => {
                warn!(%document_id, error = %close_error, "close failed after session error");
                Err(e)
            }
        }
    }
}

impl<S> Deref for Session<S>
where
    S: DocumentService + Clone,
{
    type Target = DocumentHandle<S>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<S> Drop for Session<S>
where
    S: DocumentService + Clone,
{
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let DocumentHandle {
            service,
            document_id,
        } = self.handle.clone();

        warn!(%document_id, "session dropped without close");

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = service.close_document(&document_id).await {
                        debug!(%document_id, error = %e, "background close failed");
                    }
                });
            }
            Err(_) => {
                warn!(%document_id, "no runtime available, session left open");
            }
        }
    }
}
