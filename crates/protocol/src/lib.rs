//! Client protocol for driving a remote document-processing service.
//!
//! A caller opens a session (`create_document` / `open_document`), receives
//! an opaque [`DocumentId`], applies content and query operations against
//! it, persists or converts the result, and finally closes the session.
//!
//! The operation set is closed: [`Operation`] enumerates every request, each
//! with its own argument struct, and [`Outcome`] enumerates every successful
//! payload. Anything able to execute operations implements
//! [`DocumentService`]; [`DocumentServiceExt`] layers typed calls on top and
//! [`Session`] guarantees the close.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod envelope;
mod error;
mod ids;
mod operation;
mod outcome;
mod request;
mod service;
mod session;
mod style;

pub use envelope::{PROTOCOL_VERSION, Reply, RequestEnvelope, ResponseEnvelope};
pub use error::{ErrorKind, Result, ServiceError};
pub use ids::{CorrelationId, DocumentId};
pub use operation::*;
pub use outcome::{
    Metadata, OutlineEntry, Outcome, SecurityInfo, Statistics, StorageInfo, TextMatch,
};
pub use request::Request;
pub use service::{DocumentService, DocumentServiceExt};
pub use session::{DocumentHandle, Session};
pub use style::{Alignment, Style};
