use crate::error::{EngineError, EngineResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

/// Lowercase hex SHA-256 of the given bytes.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Write `content` to `path` through a sibling temp file and a rename, so
/// readers observe either the old document or the complete new one.
pub fn atomic_write(path: &Path, content: &[u8]) -> EngineResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| EngineError::io(&parent, e))?;

    let mut temp_file = NamedTempFile::new_in(&parent).map_err(|e| EngineError::io(&parent, e))?;
    temp_file
        .write_all(content)
        .and_then(|_| temp_file.flush())
        .map_err(|e| EngineError::io(temp_file.path(), e))?;
    temp_file
        .persist(path)
        .map_err(|e| EngineError::io(path, e.error))?;
    Ok(())
}

/// Serialize `value` as indented JSON and persist it atomically off the
/// async runtime. The document is fully encoded before anything touches disk,
/// and a cancelled token aborts before the rename.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    cancel: &CancellationToken,
    operation: &'static str,
) -> EngineResult<()> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|source| EngineError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled { operation });
    }

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write(&target, &encoded))
        .await
        .map_err(|e| EngineError::io(path, std::io::Error::other(e)))?
}
