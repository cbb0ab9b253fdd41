//! Safe artifact writer
//!
//! Writes rendered artifacts produced by external generators. A batch is
//! checked by the write guards as a whole before any file is touched; each
//! file is then written atomically and recorded in the tracker.

use crate::codegen::record::GeneratedFileInfo;
use crate::codegen::tracker::GenerationTracker;
use crate::error::{EngineError, EngineResult, require_non_empty};
use crate::guards::{GuardKernel, PlannedWrite, WriteContext, ensure_not_protected};
use crate::utils::atomic_write;
use std::path::PathBuf;

/// Output of an external generator for one table/artifact pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub table_name: String,
    pub artifact_type: String,
    /// Relative to the project root, or absolute inside it
    pub path: PathBuf,
    pub content: String,
    pub schema_hash: String,
}

impl RenderedArtifact {
    pub fn new(
        table_name: impl Into<String>,
        artifact_type: impl Into<String>,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        schema_hash: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            artifact_type: artifact_type.into(),
            path: path.into(),
            content: content.into(),
            schema_hash: schema_hash.into(),
        }
    }
}

pub struct SafeArtifactWriter<'a> {
    project_root: PathBuf,
    tracker: &'a GenerationTracker,
    kernel: GuardKernel,
}

impl<'a> SafeArtifactWriter<'a> {
    pub fn new(project_root: impl Into<PathBuf>, tracker: &'a GenerationTracker) -> Self {
        Self {
            project_root: project_root.into(),
            tracker,
            kernel: GuardKernel::default_suite(),
        }
    }

    pub fn with_kernel(mut self, kernel: GuardKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Guard, write and track every artifact of the batch. Nothing is written
    /// when any guard fails.
    pub async fn write_batch(
        &self,
        artifacts: Vec<RenderedArtifact>,
    ) -> EngineResult<Vec<GeneratedFileInfo>> {
        for artifact in &artifacts {
            require_non_empty("table_name", &artifact.table_name)?;
            require_non_empty("artifact_type", &artifact.artifact_type)?;
        }

        let ctx = WriteContext::new(
            self.project_root.clone(),
            artifacts
                .iter()
                .map(|a| PlannedWrite::new(&a.table_name, &a.artifact_type, &a.path))
                .collect(),
        );

        // Protection violations surface as their own typed error.
        for write in &ctx.planned_writes {
            ensure_not_protected(&write.path.to_string_lossy())?;
        }

        let results = self.kernel.evaluate(&ctx);
        if let Some(failure) = results.failures().first() {
            return Err(EngineError::GuardRejected {
                guard: failure.guard_name.clone(),
                path: self.project_root.clone(),
                diagnostic: failure.diagnostic.clone(),
            });
        }

        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let target = ctx.resolve(&artifact.path);
            let content = artifact.content.into_bytes();
            let destination = target.clone();
            tokio::task::spawn_blocking(move || atomic_write(&destination, &content))
                .await
                .map_err(|e| EngineError::io(&target, std::io::Error::other(e)))??;

            let info = GeneratedFileInfo::new(
                artifact.table_name,
                target,
                artifact.artifact_type,
                artifact.schema_hash,
            );
            self.tracker.track_generated_file(info.clone()).await?;
            written.push(info);
        }

        tracing::info!(
            files = written.len(),
            root = %self.project_root.display(),
            "wrote generated artifacts"
        );
        Ok(written)
    }

    pub async fn write(&self, artifact: RenderedArtifact) -> EngineResult<GeneratedFileInfo> {
        let mut written = self.write_batch(vec![artifact]).await?;
        written
            .pop()
            .ok_or_else(|| EngineError::invalid_argument("artifact", "nothing was written"))
    }
}
