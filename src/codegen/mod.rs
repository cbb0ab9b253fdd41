//! Incremental Generation Module
//!
//! Decides what an external generator must regenerate and records what it
//! wrote.
//!
//! ```text
//! Annotated Snapshot → Change Detection → Tracker Check → Plan → Guarded Write → Track
//! ```
//!
//! ## Modules
//!
//! - **record**: The persisted tracking document (`.targcc/generated.json`)
//! - **tracker**: `GenerationTracker`, the only owner of the record
//! - **planner**: Per table/artifact decisions (regenerate, skip, manual review)
//! - **writer**: Guarded atomic writes that feed the tracker
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use targcc_engine::codegen::{GenerationPlanner, GenerationTracker};
//! use targcc_engine::schema::SchemaSnapshot;
//!
//! # async fn example(snapshot: SchemaSnapshot) -> anyhow::Result<()> {
//! let tracker = GenerationTracker::for_project("/path/to/project");
//! let planner = GenerationPlanner::new(&tracker, ["Entity", "Repository", "SQL"])?;
//! let plan = planner.plan(&snapshot, None).await?;
//!
//! for artifact in plan.to_regenerate() {
//!     println!("{} / {}", artifact.table_name, artifact.artifact_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod planner;
pub mod record;
pub mod tracker;
pub mod writer;

pub use planner::{ArtifactDecision, ChangesSummary, GenerationPlan, GenerationPlanner, PlannedArtifact};
pub use record::{GeneratedFileInfo, GenerationTrackingRecord, TableGenerationInfo};
pub use tracker::{
    GenerationTracker, RegenerationReason, RegenerationStatus, TRACKING_DIR, TRACKING_FILE,
};
pub use writer::{RenderedArtifact, SafeArtifactWriter};
