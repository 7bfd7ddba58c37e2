//! Restrictions a service operator can place on callers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use docflow_protocol::{Operation, SecurityInfo, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default limit on concurrently open sessions.
pub const DEFAULT_MAX_OPEN_DOCUMENTS: usize = 50;

/// Default limit on the size of a file accepted by `open_document`.
pub const DEFAULT_MAX_DOCUMENT_SIZE: u64 = 100 * 1024 * 1024;

/// Operator policy applied to every request before it runs.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicePolicy {
    /// Only allow operations that neither change state nor write files.
    /// Closing a session stays allowed so handles can be released.
    pub readonly: bool,

    /// If set, only these operation names are allowed.
    pub allowed_operations: Option<HashSet<String>>,

    /// Operation names that are always refused.
    pub denied_operations: HashSet<String>,

    /// If set, every file path must resolve inside this directory.
    pub sandbox_root: Option<PathBuf>,

    /// Maximum number of sessions open at once.
    pub max_open_documents: usize,

    /// Maximum size in bytes of a file that can be opened.
    pub max_document_size: u64,

    /// Author recorded on documents created by the service.
    pub default_author: Option<String>,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            readonly: false,
            allowed_operations: None,
            denied_operations: HashSet::new(),
            sandbox_root: None,
            max_open_documents: DEFAULT_MAX_OPEN_DOCUMENTS,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            default_author: None,
        }
    }
}

impl ServicePolicy {
    /// The caller-visible summary of this policy. Operation lists are
    /// sorted.
    #[must_use]
    pub fn security_info(&self) -> SecurityInfo {
        let sorted = |names: &HashSet<String>| {
            let mut names = names.iter().cloned().collect::<Vec<_>>();
            names.sort_unstable();
            names
        };

        SecurityInfo {
            readonly: self.readonly,
            sandbox_root: self.sandbox_root.clone(),
            allowed_operations: self.allowed_operations.as_ref().map(sorted),
            denied_operations: sorted(&self.denied_operations),
            max_open_documents: self.max_open_documents,
            max_document_size: self.max_document_size,
        }
    }

    /// Checks whether `operation` may run, including its file paths.
    ///
    /// # Errors
    ///
    /// Returns a permission-denied error naming the first violated rule.
    pub fn check(&self, operation: &Operation) -> Result<(), ServiceError> {
        let name = operation.name();

        if self.readonly
            && operation.is_mutating()
            && !matches!(operation, Operation::CloseDocument(_))
        {
            return Err(deny(format!("{name} is not allowed in read-only mode")));
        }

        if let Some(allowed) = &self.allowed_operations {
            if !allowed.contains(name) {
                return Err(deny(format!("{name} is not in the allowed operations")));
            }
        }

        if self.denied_operations.contains(name) {
            return Err(deny(format!("{name} is a denied operation")));
        }

        for path in operation.paths() {
            self.check_path(path)?;
        }

        Ok(())
    }

    /// Checks that `path` lies inside the sandbox root, if one is set.
    ///
    /// Paths that do not exist yet are resolved through their parent
    /// directory, so `..` components and symlinks cannot escape the root.
    ///
    /// # Errors
    ///
    /// Returns a permission-denied error if the path is outside the root or
    /// cannot be resolved.
    pub fn check_path(&self, path: &Path) -> Result<(), ServiceError> {
        let Some(root) = &self.sandbox_root else {
            return Ok(());
        };

        let root = root.canonicalize().map_err(|e| {
            warn!("Sandbox root {} is unusable: {}", root.display(), e);
            deny(format!("sandbox root {} is unavailable", root.display()))
        })?;

        match resolve(path) {
            Some(resolved) if resolved.starts_with(&root) => Ok(()),
            _ => Err(deny(format!(
                "{} is outside the sandbox root",
                path.display()
            ))),
        }
    }
}

fn deny(message: String) -> ServiceError {
    ServiceError::permission_denied(message)
}

/// Canonical form of `path`, or of its parent joined with the file name when
/// the path itself does not exist.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }

    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|parent| parent.join(name))
}
