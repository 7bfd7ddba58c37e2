use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use docflow_protocol::{
    DocumentId, DocumentService, ImageFormat, Metadata, Operation, Outcome, ServiceError,
    StorageInfo,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::document::{Block, Document};
use crate::error::Error;
use crate::markdown::to_markdown;
use crate::policy::ServicePolicy;
use crate::render::{PageRenderer, Renderer};
use crate::storage;

#[derive(Debug)]
struct Entry {
    document: Document,
    source_path: Option<PathBuf>,
}

#[derive(Debug)]
struct Inner {
    sessions: Mutex<HashMap<DocumentId, Entry>>,
    policy: ServicePolicy,
    renderer: Arc<dyn Renderer>,
}

/// A complete document service that keeps every session in memory.
///
/// Cloning is cheap; clones share the same sessions. The session table is
/// only locked for in-memory edits. File I/O and rendering work on a copy
/// of the document on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct MemoryService {
    inner: Arc<Inner>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    /// Creates a service with the default policy and renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ServicePolicy::default())
    }

    /// Creates a service enforcing `policy`.
    #[must_use]
    pub fn with_policy(policy: ServicePolicy) -> Self {
        Self::with_renderer(policy, Arc::new(PageRenderer::new()))
    }

    /// Creates a service enforcing `policy` and rendering with `renderer`.
    #[must_use]
    pub fn with_renderer(policy: ServicePolicy, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                policy,
                renderer,
            }),
        }
    }

    /// The policy applied to every request.
    #[must_use]
    pub fn policy(&self) -> &ServicePolicy {
        &self.inner.policy
    }

    /// Number of open sessions.
    #[must_use]
    pub fn open_documents(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    fn insert(&self, document: Document, source_path: Option<PathBuf>) -> Result<DocumentId, ServiceError> {
        let mut sessions = self.inner.sessions.lock();
        let limit = self.inner.policy.max_open_documents;
        if sessions.len() >= limit {
            return Err(ServiceError::resource_exhausted(format!(
                "open document limit of {limit} reached"
            )));
        }

        let document_id = DocumentId::generate();
        sessions.insert(
            document_id.clone(),
            Entry {
                document,
                source_path,
            },
        );
        Ok(document_id)
    }

    fn create(&self) -> Result<Outcome, ServiceError> {
        let document = Document::new(self.inner.policy.default_author.clone());
        let document_id = self.insert(document, None)?;

        info!("Created document {}", document_id);
        Ok(Outcome::Created { document_id })
    }

    async fn open(&self, path: PathBuf) -> Result<Outcome, ServiceError> {
        let limit = self.inner.policy.max_open_documents;
        if self.open_documents() >= limit {
            return Err(ServiceError::resource_exhausted(format!(
                "open document limit of {limit} reached"
            )));
        }

        let max_size = self.inner.policy.max_document_size;
        let read_path = path.clone();
        let document = blocking(move || storage::read_snapshot(&read_path, max_size))
            .await?
            .ok_or_else(|| {
                ServiceError::resource_exhausted(format!(
                    "{} exceeds the document size limit of {max_size} bytes",
                    path.display()
                ))
            })?;

        let document_id = self.insert(document, Some(path.clone()))?;

        info!("Opened document {} from {}", document_id, path.display());
        Ok(Outcome::Created { document_id })
    }

    fn close(&self, document_id: &DocumentId) -> Result<Outcome, ServiceError> {
        self.inner
            .sessions
            .lock()
            .remove(document_id)
            .ok_or_else(|| ServiceError::invalid_handle(document_id))?;

        info!("Closed document {}", document_id);
        Ok(Outcome::Done)
    }

    /// Runs `f` against a live session under the lock.
    fn with_entry<T>(
        &self,
        document_id: &DocumentId,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> Result<T, ServiceError> {
        let mut sessions = self.inner.sessions.lock();
        let entry = sessions
            .get_mut(document_id)
            .ok_or_else(|| ServiceError::invalid_handle(document_id))?;
        Ok(f(entry))
    }

    fn edit(
        &self,
        document_id: &DocumentId,
        f: impl FnOnce(&mut Document),
    ) -> Result<Outcome, ServiceError> {
        self.with_entry(document_id, |entry| f(&mut entry.document))?;
        Ok(Outcome::Done)
    }

    fn push(&self, document_id: &DocumentId, block: Block) -> Result<Outcome, ServiceError> {
        self.edit(document_id, |document| document.push(block))
    }

    /// Copy of the current document state, for work done outside the lock.
    fn snapshot(&self, document_id: &DocumentId) -> Result<Document, ServiceError> {
        self.with_entry(document_id, |entry| entry.document.clone())
    }

    async fn save(&self, document_id: &DocumentId, path: PathBuf) -> Result<Outcome, ServiceError> {
        let document = self.snapshot(document_id)?;
        blocking(move || storage::write_atomic(&path, &storage::encode_snapshot(&document)?))
            .await?;

        debug!("Saved document {}", document_id);
        Ok(Outcome::Done)
    }

    async fn convert_to_pdf(
        &self,
        document_id: &DocumentId,
        path: PathBuf,
    ) -> Result<Outcome, ServiceError> {
        let document = self.snapshot(document_id)?;
        let renderer = Arc::clone(&self.inner.renderer);
        blocking(move || storage::write_atomic(&path, &renderer.render_pdf(&document)?)).await?;

        debug!("Converted document {} to PDF", document_id);
        Ok(Outcome::Done)
    }

    async fn convert_to_images(
        &self,
        document_id: &DocumentId,
        dir: PathBuf,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Outcome, ServiceError> {
        let document = self.snapshot(document_id)?;
        let renderer = Arc::clone(&self.inner.renderer);

        let paths = blocking(move || {
            if !dir.is_dir() {
                return Err(Error::io(
                    &dir,
                    io::Error::new(io::ErrorKind::NotFound, "output directory does not exist"),
                ));
            }

            let images = renderer.render_images(&document, format, dpi)?;
            let mut paths = Vec::with_capacity(images.len());
            for (index, bytes) in images.iter().enumerate() {
                let path = dir.join(format!("page-{}.{}", index + 1, format.extension()));
                storage::write_atomic(&path, bytes)?;
                paths.push(path);
            }
            Ok(paths)
        })
        .await?;

        debug!(
            "Converted document {} to {} {} images",
            document_id,
            paths.len(),
            format
        );
        Ok(Outcome::Images { paths })
    }

    async fn export_to_markdown(
        &self,
        document_id: &DocumentId,
        path: PathBuf,
    ) -> Result<Outcome, ServiceError> {
        let markdown = to_markdown(&self.snapshot(document_id)?);
        blocking(move || storage::write_atomic(&path, markdown.as_bytes())).await?;

        debug!("Exported document {} as Markdown", document_id);
        Ok(Outcome::Done)
    }

    fn storage_info(&self) -> StorageInfo {
        let sessions = self.inner.sessions.lock();
        StorageInfo {
            open_documents: sessions.len(),
            max_open_documents: self.inner.policy.max_open_documents,
            text_bytes: sessions
                .values()
                .map(|entry| entry.document.extract_text().len())
                .sum(),
        }
    }

    fn list(&self) -> Outcome {
        let sessions = self.inner.sessions.lock();
        let mut documents = sessions
            .iter()
            .map(|(document_id, entry)| metadata(document_id, entry))
            .collect::<Vec<_>>();
        drop(sessions);

        documents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_id.as_str().cmp(b.document_id.as_str()))
        });
        Outcome::Documents { documents }
    }
}

#[async_trait]
impl DocumentService for MemoryService {
    type Error = ServiceError;

    #[instrument(skip_all, fields(operation = operation.name()))]
    async fn execute(&self, operation: Operation) -> Result<Outcome, ServiceError> {
        operation.validate()?;
        self.inner.policy.check(&operation)?;

        match operation {
            Operation::CreateDocument => self.create(),
            Operation::OpenDocument(op) => self.open(op.path).await,
            Operation::AddHeading(op) => self.push(
                &op.document_id,
                Block::Heading {
                    text: op.text,
                    level: op.level,
                },
            ),
            Operation::AddParagraph(op) => self.push(
                &op.document_id,
                Block::Paragraph {
                    text: op.text,
                    style: op.style.filter(|style| !style.is_empty()),
                },
            ),
            Operation::AddTable(op) => self.push(&op.document_id, Block::Table { rows: op.rows }),
            Operation::AddList(op) => self.push(
                &op.document_id,
                Block::List {
                    items: op.items,
                    ordered: op.ordered,
                },
            ),
            Operation::AddPageBreak(op) => self.push(&op.document_id, Block::PageBreak),
            Operation::SetHeader(op) => {
                self.edit(&op.document_id, |document| document.set_header(op.text))
            }
            Operation::SetFooter(op) => {
                self.edit(&op.document_id, |document| document.set_footer(op.text))
            }
            Operation::FindAndReplace(op) => {
                let count = self.with_entry(&op.document_id, |entry| {
                    entry.document.replace_all(&op.find_text, &op.replace_text)
                })?;
                debug!("Replaced {} occurrences in {}", count, op.document_id);
                Ok(Outcome::Replaced { count })
            }
            Operation::ExtractText(op) => {
                let text = self.with_entry(&op.document_id, |entry| entry.document.extract_text())?;
                Ok(Outcome::Text { text })
            }
            Operation::GetMetadata(op) => {
                let metadata =
                    self.with_entry(&op.document_id, |entry| metadata(&op.document_id, entry))?;
                Ok(Outcome::Metadata { metadata })
            }
            Operation::SaveDocument(op) => self.save(&op.document_id, op.output_path).await,
            Operation::ConvertToPdf(op) => {
                self.convert_to_pdf(&op.document_id, op.output_path).await
            }
            Operation::ConvertToImages(op) => {
                self.convert_to_images(&op.document_id, op.output_dir, op.format, op.dpi)
                    .await
            }
            Operation::CloseDocument(op) => self.close(&op.document_id),
            Operation::ListDocuments => Ok(self.list()),
            Operation::SearchText(op) => {
                let matches = self.with_entry(&op.document_id, |entry| {
                    entry
                        .document
                        .search(&op.term, op.case_sensitive, op.whole_word)
                })?;
                Ok(Outcome::Matches { matches })
            }
            Operation::GetStatistics(op) => {
                let statistics =
                    self.with_entry(&op.document_id, |entry| entry.document.statistics())?;
                Ok(Outcome::Statistics { statistics })
            }
            Operation::ExportToMarkdown(op) => {
                self.export_to_markdown(&op.document_id, op.output_path)
                    .await
            }
            Operation::GetDocumentStructure(op) => {
                let outline = self.with_entry(&op.document_id, |entry| entry.document.outline())?;
                Ok(Outcome::Structure { outline })
            }
            Operation::GetSecurityInfo => Ok(Outcome::Security {
                security: self.inner.policy.security_info(),
            }),
            Operation::GetStorageInfo => Ok(Outcome::Storage {
                storage: self.storage_info(),
            }),
        }
    }
}

fn metadata(document_id: &DocumentId, entry: &Entry) -> Metadata {
    let document = &entry.document;
    Metadata {
        document_id: document_id.clone(),
        title: document.title().map(str::to_string),
        author: document.author.clone(),
        subject: document.subject.clone(),
        created_at: document.created_at,
        modified_at: document.modified_at,
        page_count: document.page_count(),
        word_count: document.word_count(),
        source_path: entry.source_path.clone(),
    }
}

/// Runs file work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f).await.map_err(Error::from)?;
    Ok(result?)
}
