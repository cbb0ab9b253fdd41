//! Per table and artifact type regeneration decisions for one run.

use crate::changes::{SchemaChangeDetector, SchemaChanges, TableChangeDetection, TableChangeType};
use crate::codegen::tracker::{GenerationTracker, RegenerationReason, RegenerationStatus};
use crate::error::{EngineError, EngineResult};
use crate::schema::SchemaSnapshot;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ArtifactDecision {
    Regenerate { reason: RegenerationReason },
    Skip,
    /// A manual file owns this artifact and the schema moved underneath it.
    ManualReview { changes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedArtifact {
    pub table_name: String,
    pub artifact_type: String,
    pub schema_hash: String,
    pub decision: ArtifactDecision,
}

impl PlannedArtifact {
    pub fn requires_generation(&self) -> bool {
        matches!(self.decision, ArtifactDecision::Regenerate { .. })
    }
}

/// Table-level counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangesSummary {
    pub total_tables: usize,
    pub new_tables: Vec<String>,
    pub modified_tables: Vec<String>,
    pub unchanged_tables: Vec<String>,
}

impl ChangesSummary {
    fn from_detections(detections: &[TableChangeDetection]) -> Self {
        let mut summary = ChangesSummary {
            total_tables: detections.len(),
            ..Default::default()
        };
        for detection in detections {
            let bucket = match detection.change_type {
                TableChangeType::New => &mut summary.new_tables,
                TableChangeType::Modified => &mut summary.modified_tables,
                TableChangeType::Unchanged => &mut summary.unchanged_tables,
            };
            bucket.push(detection.table_name.clone());
        }
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationPlan {
    pub artifacts: Vec<PlannedArtifact>,
    /// Tracked or previously snapshotted tables missing from the new snapshot
    pub removed_tables: Vec<String>,
    pub summary: ChangesSummary,
    /// Structural diff against the previous snapshot, empty when there was none
    pub changes: SchemaChanges,
}

impl GenerationPlan {
    pub fn to_regenerate(&self) -> impl Iterator<Item = &PlannedArtifact> {
        self.artifacts.iter().filter(|a| a.requires_generation())
    }

    pub fn manual_reviews(&self) -> impl Iterator<Item = &PlannedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| matches!(a.decision, ArtifactDecision::ManualReview { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PlannedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.decision == ArtifactDecision::Skip)
    }

    pub fn regeneration_count(&self) -> usize {
        self.to_regenerate().count()
    }
}

pub struct GenerationPlanner<'a> {
    tracker: &'a GenerationTracker,
    artifact_types: Vec<String>,
    detector: SchemaChangeDetector,
}

impl<'a> GenerationPlanner<'a> {
    pub fn new<I, S>(tracker: &'a GenerationTracker, artifact_types: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let artifact_types: Vec<String> = artifact_types.into_iter().map(Into::into).collect();
        if artifact_types.is_empty() || artifact_types.iter().any(|t| t.trim().is_empty()) {
            return Err(EngineError::invalid_argument(
                "artifact_types",
                "at least one non-empty artifact type is required",
            ));
        }
        Ok(Self {
            tracker,
            artifact_types,
            detector: SchemaChangeDetector::new(),
        })
    }

    /// Decide every table/artifact pair of `snapshot`. `previous` is the last
    /// persisted snapshot, used only to explain changes.
    pub async fn plan(
        &self,
        snapshot: &SchemaSnapshot,
        previous: Option<&SchemaSnapshot>,
    ) -> EngineResult<GenerationPlan> {
        let changes = previous
            .map(|old| self.detector.diff(old, snapshot))
            .unwrap_or_default();

        let recorded_hashes = self.tracker.record().await?.table_hashes();
        let detections = TableChangeDetection::detect(snapshot, &recorded_hashes);

        let mut artifacts = Vec::with_capacity(detections.len() * self.artifact_types.len());
        for detection in &detections {
            for artifact_type in &self.artifact_types {
                let status = self
                    .tracker
                    .regeneration_status(&detection.table_name, artifact_type, &detection.current_hash)
                    .await?;

                let decision = match status {
                    RegenerationStatus::Required(reason) => ArtifactDecision::Regenerate { reason },
                    RegenerationStatus::UpToDate | RegenerationStatus::Manual { schema_changed: false } => {
                        ArtifactDecision::Skip
                    }
                    RegenerationStatus::Manual { schema_changed: true } => {
                        let mut descriptions = changes
                            .changes_for_table(&detection.table_name)
                            .descriptions();
                        if descriptions.is_empty() {
                            descriptions.push(format!(
                                "Schema of '{}' changed since the manual file was generated",
                                detection.table_name
                            ));
                        }
                        ArtifactDecision::ManualReview {
                            changes: descriptions,
                        }
                    }
                };

                tracing::debug!(
                    table = %detection.table_name,
                    artifact_type = %artifact_type,
                    decision = ?decision,
                    "planned artifact"
                );

                artifacts.push(PlannedArtifact {
                    table_name: detection.table_name.clone(),
                    artifact_type: artifact_type.clone(),
                    schema_hash: detection.current_hash.clone(),
                    decision,
                });
            }
        }

        let current: HashSet<&str> = snapshot.table_names().collect();
        let removed_tables: Vec<String> = recorded_hashes
            .keys()
            .map(String::as_str)
            .chain(previous.into_iter().flat_map(|p| p.table_names()))
            .filter(|name| !current.contains(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let plan = GenerationPlan {
            summary: ChangesSummary::from_detections(&detections),
            artifacts,
            removed_tables,
            changes,
        };

        tracing::info!(
            tables = plan.summary.total_tables,
            new = plan.summary.new_tables.len(),
            modified = plan.summary.modified_tables.len(),
            regenerate = plan.regeneration_count(),
            manual_review = plan.manual_reviews().count(),
            removed = plan.removed_tables.len(),
            "generation plan ready"
        );

        Ok(plan)
    }
}
