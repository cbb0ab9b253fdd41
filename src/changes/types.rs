//! Typed change entries produced by the schema change detector.

use crate::schema::{Column, Index, Relationship, Table};
use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// Old/new metadata of a change. The variant fixes which side is present,
/// so an entry can never carry neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delta<T> {
    Added { new: T },
    Removed { old: T },
    Modified { old: T, new: T },
}

impl<T> Delta<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Delta::Added { .. } => ChangeKind::Added,
            Delta::Removed { .. } => ChangeKind::Removed,
            Delta::Modified { .. } => ChangeKind::Modified,
        }
    }

    pub fn old_value(&self) -> Option<&T> {
        match self {
            Delta::Added { .. } => None,
            Delta::Removed { old } | Delta::Modified { old, .. } => Some(old),
        }
    }

    pub fn new_value(&self) -> Option<&T> {
        match self {
            Delta::Removed { .. } => None,
            Delta::Added { new } | Delta::Modified { new, .. } => Some(new),
        }
    }
}

/// One change to a named schema element within a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaChange<T> {
    /// Owning table
    pub table_name: String,
    /// Name of the changed element; equals `table_name` for table changes
    pub name: String,
    pub delta: Delta<T>,
    pub description: String,
}

impl<T> SchemaChange<T> {
    pub fn kind(&self) -> ChangeKind {
        self.delta.kind()
    }

    pub fn old_value(&self) -> Option<&T> {
        self.delta.old_value()
    }

    pub fn new_value(&self) -> Option<&T> {
        self.delta.new_value()
    }
}

pub type TableChange = SchemaChange<Table>;
pub type ColumnChange = SchemaChange<Column>;
pub type IndexChange = SchemaChange<Index>;
pub type RelationshipChange = SchemaChange<Relationship>;

/// Counts per change kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCounts {
    fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Modified => self.modified += 1,
        }
    }
}

/// Result of diffing two snapshots. Totals are always recomputed from the
/// four lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaChanges {
    pub table_changes: Vec<TableChange>,
    pub column_changes: Vec<ColumnChange>,
    pub index_changes: Vec<IndexChange>,
    pub relationship_changes: Vec<RelationshipChange>,
}

impl SchemaChanges {
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    pub fn total_changes(&self) -> usize {
        self.table_changes.len()
            + self.column_changes.len()
            + self.index_changes.len()
            + self.relationship_changes.len()
    }

    /// Every change touching `table_name`.
    pub fn changes_for_table(&self, table_name: &str) -> SchemaChanges {
        fn only<T: Clone>(changes: &[SchemaChange<T>], table_name: &str) -> Vec<SchemaChange<T>> {
            changes
                .iter()
                .filter(|c| c.table_name == table_name)
                .cloned()
                .collect()
        }

        SchemaChanges {
            table_changes: only(&self.table_changes, table_name),
            column_changes: only(&self.column_changes, table_name),
            index_changes: only(&self.index_changes, table_name),
            relationship_changes: only(&self.relationship_changes, table_name),
        }
    }

    /// Human-readable descriptions in list order: tables, columns, indexes,
    /// relationships.
    pub fn descriptions(&self) -> Vec<String> {
        self.table_changes
            .iter()
            .map(|c| c.description.clone())
            .chain(self.column_changes.iter().map(|c| c.description.clone()))
            .chain(self.index_changes.iter().map(|c| c.description.clone()))
            .chain(self.relationship_changes.iter().map(|c| c.description.clone()))
            .collect()
    }

    pub fn summary(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        self.table_changes
            .iter()
            .map(|c| c.kind())
            .chain(self.column_changes.iter().map(|c| c.kind()))
            .chain(self.index_changes.iter().map(|c| c.kind()))
            .chain(self.relationship_changes.iter().map(|c| c.kind()))
            .for_each(|kind| counts.record(kind));
        counts
    }
}
