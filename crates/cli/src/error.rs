use std::io;
use std::path::PathBuf;

use docflow_protocol::ServiceError;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport or remote service error
    #[error(transparent)]
    Rpc(#[from] docflow_rpc::Error),

    /// Error reported by an in-process service
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Operation name or arguments did not decode
    #[error("invalid operation: {0}")]
    InvalidOperation(#[source] serde_json::Error),

    /// Script file could not be read
    #[error("failed to read script {}: {source}", .path.display())]
    ScriptIo {
        /// Script path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Script file is not a JSON array of operations
    #[error("invalid script {}: {source}", .path.display())]
    ScriptFormat {
        /// Script path
        path: PathBuf,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// A script step referenced `$document_id` with no document open
    #[error("step {0} uses $document_id before any document was created or opened")]
    NoDocument(usize),

    /// A script step failed
    #[error("step {step} ({operation}) failed: {source}")]
    Step {
        /// 1-based step number
        step: usize,
        /// Operation name
        operation: &'static str,
        /// Why the step failed
        #[source]
        source: Box<Error>,
    },

    /// Writing results failed
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
