use std::io;
use std::path::{Path, PathBuf};

use docflow_protocol::{ErrorKind, ServiceError};
use thiserror::Error;

/// Failures inside the storage and rendering layers.
///
/// These never cross the service boundary directly; they are reported to
/// callers as [`ServiceError`]s.
#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be read or written.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A snapshot file did not decode.
    #[error("{}: not a readable document ({reason})", .path.display())]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// A snapshot was written by an incompatible version.
    #[error("{}: unsupported snapshot version {version}", .path.display())]
    UnsupportedVersion {
        /// File involved.
        path: PathBuf,
        /// Version found in the file.
        version: u32,
    },

    /// The document could not be serialized.
    #[error("failed to encode document: {0}")]
    Encode(String),

    /// Page rendering failed.
    #[error("rendering failed: {0}")]
    Render(String),

    /// Image encoding failed.
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// A blocking task did not complete.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<Error> for ServiceError {
    fn from(error: Error) -> Self {
        match &error {
            Error::Io { .. } | Error::Corrupt { .. } | Error::UnsupportedVersion { .. } => {
                Self::new(ErrorKind::Io, error.to_string())
            }
            Error::Render(_) | Error::Image(_) => Self::conversion(error.to_string()),
            Error::Encode(_) | Error::Task(_) => Self::internal(error.to_string()),
        }
    }
}
