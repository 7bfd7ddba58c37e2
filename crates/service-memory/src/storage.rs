//! Document files on disk.
//!
//! A saved document is a CBOR snapshot tagged with a format version. Every
//! output file, snapshot or rendering, is written to a temporary file in
//! the destination directory and renamed into place, so readers never see
//! a partial file.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::Document;
use crate::error::Error;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    document: &'a Document,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    document: ciborium::Value,
}

/// Encodes `document` as a snapshot.
///
/// # Errors
///
/// Fails only if the document cannot be serialized.
pub fn encode_snapshot(document: &Document) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(
        &SnapshotRef {
            version: SNAPSHOT_VERSION,
            document,
        },
        &mut bytes,
    )
    .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a snapshot read from `path`.
///
/// # Errors
///
/// Fails if the bytes are not a snapshot of a supported version.
pub fn decode_snapshot(path: &Path, bytes: &[u8]) -> Result<Document, Error> {
    let corrupt = |reason: String| Error::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let snapshot: Snapshot =
        ciborium::de::from_reader(bytes).map_err(|e| corrupt(e.to_string()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::UnsupportedVersion {
            path: path.to_path_buf(),
            version: snapshot.version,
        });
    }

    snapshot
        .document
        .deserialized()
        .map_err(|e| corrupt(e.to_string()))
}

/// Reads a snapshot, refusing files larger than `max_size` bytes.
///
/// Returns `Ok(None)` if the file exceeds the limit.
///
/// # Errors
///
/// Fails if the file is missing, unreadable or corrupt.
pub fn read_snapshot(path: &Path, max_size: u64) -> Result<Option<Document>, Error> {
    let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
    if size > max_size {
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    decode_snapshot(path, &bytes).map(Some)
}

/// Writes `bytes` to `path` atomically.
///
/// The parent directory must already exist.
///
/// # Errors
///
/// Fails if the directory is missing or not writable.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
    file.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    file.persist(path).map_err(|e| Error::io(path, e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
