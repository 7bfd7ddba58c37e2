//! In-memory implementation of the document service.
//!
//! [`MemoryService`] implements every operation of
//! [`DocumentService`](docflow_protocol::DocumentService) against documents
//! held in memory. Saved documents are versioned CBOR snapshots, PDF and
//! image conversion go through a pluggable [`Renderer`], and a
//! [`ServicePolicy`] restricts what callers may do. It backs the `docflow`
//! server and doubles as a test service for anything written against the
//! protocol.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod document;
mod error;
mod markdown;
mod policy;
mod render;
mod service;
mod storage;

pub use document::{Block, Document};
pub use error::Error;
pub use markdown::to_markdown;
pub use policy::{DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_OPEN_DOCUMENTS, ServicePolicy};
pub use render::{PageRenderer, Renderer};
pub use service::MemoryService;
pub use storage::SNAPSHOT_VERSION;
