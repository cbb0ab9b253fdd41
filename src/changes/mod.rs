//! Schema change detection: structural diffs and hash-based table comparison.

pub mod detection;
pub mod detector;
pub mod types;

pub use detection::{TableChangeDetection, TableChangeType, hash_changed};
pub use detector::SchemaChangeDetector;
pub use types::{
    ChangeCounts, ChangeKind, ColumnChange, Delta, IndexChange, RelationshipChange, SchemaChange,
    SchemaChanges, TableChange,
};
