use crate::error::{EngineError, EngineResult};
use crate::schema::SchemaSnapshot;
use crate::utils::write_json_atomic;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Persists the last annotated snapshot so the next run can diff against it.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    cancel: CancellationToken,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous snapshot, if one was saved. A missing or unreadable document
    /// means there is nothing to compare against.
    pub async fn load(&self) -> Option<SchemaSnapshot> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no previous schema snapshot");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read schema snapshot");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "corrupt schema snapshot ignored"
                );
                None
            }
        }
    }

    pub async fn save(&self, snapshot: &SchemaSnapshot) -> EngineResult<()> {
        write_json_atomic(&self.path, snapshot, &self.cancel, "save_snapshot").await?;
        tracing::info!(
            path = %self.path.display(),
            tables = snapshot.tables.len(),
            "schema snapshot saved"
        );
        Ok(())
    }

    /// Remove the stored snapshot; absent files are not an error.
    pub async fn clear(&self) -> EngineResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::io(&self.path, e)),
        }
    }
}
