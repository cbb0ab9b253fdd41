//! Generation tracker
//!
//! One `GenerationTracker` handle owns the tracking record of one project.
//! The record is loaded lazily on first use and cached in the handle. Every
//! mutation works on a copy of the cached record, persists the whole
//! document, and only then replaces the cache, so a failed or cancelled save
//! leaves both disk and memory untouched.
//!
//! Handles do not coordinate across processes; callers that run overlapping
//! generations against one project must serialize access themselves.

use crate::codegen::record::{GeneratedFileInfo, GenerationTrackingRecord};
use crate::error::{EngineError, EngineResult, require_non_empty};
use crate::utils::write_json_atomic;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use strum::Display;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const TRACKING_DIR: &str = ".targcc";
pub const TRACKING_FILE: &str = "generated.json";

/// Why an artifact must be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum RegenerationReason {
    /// Table has never been generated
    NewTable,
    /// Table is tracked but has no file of this artifact type
    MissingArtifact,
    /// Schema hash differs from the one the artifact was generated with
    SchemaChanged,
    /// Tracked file no longer exists on disk
    FileMissing,
}

/// Outcome of checking one table/artifact pair against the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegenerationStatus {
    Required(RegenerationReason),
    UpToDate,
    /// A manually owned file exists for the artifact. Never regenerated;
    /// `schema_changed` tells callers whether a manual review is due.
    Manual { schema_changed: bool },
}

impl RegenerationStatus {
    pub fn needs_regeneration(&self) -> bool {
        matches!(self, RegenerationStatus::Required(_))
    }
}

#[derive(Debug)]
pub struct GenerationTracker {
    path: PathBuf,
    cache: Mutex<Option<GenerationTrackingRecord>>,
    cancel: CancellationToken,
}

impl GenerationTracker {
    /// Tracker backed by an explicit document path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Tracker at the conventional `<project>/.targcc/generated.json`.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::new(
            project_root
                .as_ref()
                .join(TRACKING_DIR)
                .join(TRACKING_FILE),
        )
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn storage_path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached record; the next operation reads the document again.
    pub async fn reload(&self) {
        *self.cache.lock().await = None;
        tracing::debug!(path = %self.path.display(), "tracking cache dropped");
    }

    /// Copy of the current record.
    pub async fn record(&self) -> EngineResult<GenerationTrackingRecord> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache).await?.clone())
    }

    pub async fn regeneration_status(
        &self,
        table_name: &str,
        artifact_type: &str,
        current_schema_hash: &str,
    ) -> EngineResult<RegenerationStatus> {
        require_non_empty("table_name", table_name)?;
        require_non_empty("artifact_type", artifact_type)?;

        let (table_hash, files): (String, Vec<GeneratedFileInfo>) = {
            let mut cache = self.cache.lock().await;
            let record = self.loaded(&mut cache).await?;
            match record.tables.get(table_name) {
                None => {
                    tracing::debug!(table = table_name, "table never generated");
                    return Ok(RegenerationStatus::Required(RegenerationReason::NewTable));
                }
                Some(info) => (
                    info.schema_hash.clone(),
                    info.files_of_type(artifact_type).cloned().collect(),
                ),
            }
        };

        if files.is_empty() {
            tracing::debug!(
                table = table_name,
                artifact_type,
                "artifact type never generated"
            );
            return Ok(RegenerationStatus::Required(
                RegenerationReason::MissingArtifact,
            ));
        }

        // Manual ownership wins over every other signal. The review signal
        // compares the hash the manual file itself was generated from.
        let manual: Vec<&GeneratedFileInfo> = files.iter().filter(|f| f.is_manual).collect();
        if !manual.is_empty() {
            let schema_changed = manual.iter().any(|f| f.schema_hash != current_schema_hash);
            tracing::debug!(
                table = table_name,
                artifact_type,
                schema_changed,
                "manual file present, skipping regeneration"
            );
            return Ok(RegenerationStatus::Manual { schema_changed });
        }

        if table_hash != current_schema_hash {
            tracing::debug!(
                table = table_name,
                artifact_type,
                stored = %table_hash,
                "schema changed"
            );
            return Ok(RegenerationStatus::Required(
                RegenerationReason::SchemaChanged,
            ));
        }

        for file in &files {
            let exists = tokio::fs::try_exists(&file.file_path)
                .await
                .unwrap_or(false);
            if !exists {
                tracing::debug!(path = %file.file_path.display(), "tracked file missing on disk");
                return Ok(RegenerationStatus::Required(RegenerationReason::FileMissing));
            }
        }

        Ok(RegenerationStatus::UpToDate)
    }

    /// Whether the artifact must be regenerated. Manual files always answer
    /// `false`, even when the schema changed.
    pub async fn needs_regeneration(
        &self,
        table_name: &str,
        artifact_type: &str,
        current_schema_hash: &str,
    ) -> EngineResult<bool> {
        Ok(self
            .regeneration_status(table_name, artifact_type, current_schema_hash)
            .await?
            .needs_regeneration())
    }

    pub async fn track_generated_file(&self, file: GeneratedFileInfo) -> EngineResult<()> {
        require_non_empty("table_name", &file.table_name)?;
        require_non_empty("artifact_type", &file.artifact_type)?;
        if file.file_path.as_os_str().is_empty() {
            return Err(EngineError::invalid_argument(
                "file_path",
                "value must not be empty",
            ));
        }

        let table = file.table_name.clone();
        let path = file.file_path.clone();
        self.mutate("track_generated_file", |record| record.track(file))
            .await?;

        tracing::info!(table = %table, path = %path.display(), "tracked generated file");
        Ok(())
    }

    pub async fn get_last_generation_time(
        &self,
        table_name: &str,
    ) -> EngineResult<Option<DateTime<Utc>>> {
        require_non_empty("table_name", table_name)?;
        let mut cache = self.cache.lock().await;
        let record = self.loaded(&mut cache).await?;
        Ok(record.tables.get(table_name).map(|t| t.last_generated))
    }

    /// Forget everything recorded for `table_name`. Untracked tables are a
    /// no-op and do not touch the document.
    pub async fn clear_tracking(&self, table_name: &str) -> EngineResult<()> {
        require_non_empty("table_name", table_name)?;

        {
            let mut cache = self.cache.lock().await;
            if !self.loaded(&mut cache).await?.tables.contains_key(table_name) {
                tracing::debug!(table = table_name, "clear requested for untracked table");
                return Ok(());
            }
        }

        self.mutate("clear_tracking", |record| {
            record.tables.remove(table_name);
        })
        .await?;
        tracing::info!(table = table_name, "cleared generation tracking");
        Ok(())
    }

    /// Reset the whole record.
    pub async fn clear_all(&self) -> EngineResult<()> {
        self.mutate("clear_all", |record| record.tables.clear())
            .await?;
        tracing::info!(path = %self.path.display(), "cleared all generation tracking");
        Ok(())
    }

    /// Files recorded for `table_name`; empty when untracked.
    pub async fn get_generated_files(&self, table_name: &str) -> EngineResult<Vec<GeneratedFileInfo>> {
        require_non_empty("table_name", table_name)?;
        let mut cache = self.cache.lock().await;
        let record = self.loaded(&mut cache).await?;
        Ok(record
            .tables
            .get(table_name)
            .map(|t| t.files.clone())
            .unwrap_or_default())
    }

    pub async fn tracked_tables(&self) -> EngineResult<Vec<String>> {
        let mut cache = self.cache.lock().await;
        let record = self.loaded(&mut cache).await?;
        Ok(record.tables.keys().cloned().collect())
    }

    pub async fn all_generated_files(&self) -> EngineResult<Vec<GeneratedFileInfo>> {
        let mut cache = self.cache.lock().await;
        let record = self.loaded(&mut cache).await?;
        Ok(record
            .tables
            .values()
            .flat_map(|t| t.files.iter().cloned())
            .collect())
    }

    // ------------------------------------------------------------------------
    // Load / persist
    // ------------------------------------------------------------------------

    async fn loaded<'a>(
        &self,
        cache: &'a mut Option<GenerationTrackingRecord>,
    ) -> EngineResult<&'a mut GenerationTrackingRecord> {
        if cache.is_none() {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(EngineError::Cancelled { operation: "load_tracking" });
                }
                record = load_record(&self.path) => record,
            };
            *cache = Some(record);
        }
        Ok(cache.get_or_insert_with(GenerationTrackingRecord::default))
    }

    async fn mutate(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut GenerationTrackingRecord),
    ) -> EngineResult<()> {
        let mut cache = self.cache.lock().await;
        let mut updated = self.loaded(&mut cache).await?.clone();
        apply(&mut updated);

        write_json_atomic(&self.path, &updated, &self.cancel, operation).await?;
        tracing::debug!(
            path = %self.path.display(),
            tables = updated.tables.len(),
            operation,
            "saved tracking record"
        );

        *cache = Some(updated);
        Ok(())
    }
}

/// Read the record, degrading every failure to an empty record.
async fn load_record(path: &Path) -> GenerationTrackingRecord {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "tracking file not found, starting empty");
            return GenerationTrackingRecord::default();
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read tracking file, starting empty");
            return GenerationTrackingRecord::default();
        }
    };

    match serde_json::from_str::<GenerationTrackingRecord>(&contents) {
        Ok(record) => {
            tracing::debug!(path = %path.display(), tables = record.tables.len(), "loaded tracking record");
            record
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "corrupt tracking file, starting empty");
            GenerationTrackingRecord::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_for_project_uses_conventional_path() {
        let tracker = GenerationTracker::for_project("/project");
        assert_eq!(
            tracker.storage_path(),
            Path::new("/project/.targcc/generated.json")
        );
    }

    #[tokio::test]
    async fn test_empty_arguments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = GenerationTracker::for_project(dir.path());
        assert!(matches!(
            tracker.needs_regeneration("", "Entity", "h").await,
            Err(EngineError::InvalidArgument { parameter: "table_name", .. })
        ));
        assert!(matches!(
            tracker.needs_regeneration("Customer", " ", "h").await,
            Err(EngineError::InvalidArgument { parameter: "artifact_type", .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_untracked_table_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = GenerationTracker::for_project(dir.path());
        tracker.clear_tracking("Ghost").await.unwrap();
        assert!(!tracker.storage_path().exists());
    }

    #[tokio::test]
    async fn test_cancelled_track_keeps_cache_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let tracker = GenerationTracker::for_project(dir.path()).with_cancellation(token.clone());
        let file = dir.path().join("Customer.cs");

        tracker
            .track_generated_file(GeneratedFileInfo::new("Customer", &file, "Entity", "H1"))
            .await
            .unwrap();

        token.cancel();
        let result = tracker
            .track_generated_file(GeneratedFileInfo::new("Order", dir.path().join("Order.cs"), "Entity", "H1"))
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled { .. })));

        assert_eq!(tracker.tracked_tables().await.unwrap(), vec!["Customer".to_string()]);
        let on_disk: GenerationTrackingRecord =
            serde_json::from_str(&std::fs::read_to_string(tracker.storage_path()).unwrap()).unwrap();
        assert_eq!(on_disk.tables.len(), 1);
    }
}
