//! Snapshot diffing
//!
//! Every entity kind is keyed by name, never by position, so reordering
//! columns or indexes produces no change entries. Columns, indexes and
//! relationships are only compared for tables present in both snapshots; an
//! added or removed table is reported once at table level.
//!
//! Duplicate names inside one collection should not occur; when they do the
//! first occurrence is authoritative and later ones are ignored.

use super::types::{
    ColumnChange, Delta, IndexChange, RelationshipChange, SchemaChange, SchemaChanges, TableChange,
};
use crate::schema::{Column, Index, Relationship, SchemaSnapshot, Table};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaChangeDetector;

impl SchemaChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Diff against the last saved snapshot. Without one there is nothing to
    /// compare and the change set is empty.
    pub fn detect_changes(
        &self,
        previous: Option<&SchemaSnapshot>,
        current: &SchemaSnapshot,
    ) -> SchemaChanges {
        match previous {
            Some(previous) => self.diff(previous, current),
            None => {
                tracing::warn!("no previous schema snapshot, change detection skipped");
                SchemaChanges::default()
            }
        }
    }

    /// Diff `old` against `new`. Never fails; malformed input degrades to
    /// "no change" for the affected element.
    pub fn diff(&self, old: &SchemaSnapshot, new: &SchemaSnapshot) -> SchemaChanges {
        let old_tables = keyed(&old.tables, |t| t.name.clone());
        let new_tables = keyed(&new.tables, |t| t.name.clone());

        let mut changes = SchemaChanges::default();

        for (name, table) in &new_tables {
            if !old_tables.contains_key(name) {
                changes.table_changes.push(table_change(
                    name,
                    Delta::Added {
                        new: (*table).clone(),
                    },
                    format!("Table '{name}' was added"),
                ));
            }
        }

        for (name, table) in &old_tables {
            if !new_tables.contains_key(name) {
                changes.table_changes.push(table_change(
                    name,
                    Delta::Removed {
                        old: (*table).clone(),
                    },
                    format!("Table '{name}' was removed"),
                ));
            }
        }

        for (name, new_table) in &new_tables {
            let Some(old_table) = old_tables.get(name) else {
                continue;
            };

            if old_table.schema != new_table.schema {
                changes.table_changes.push(table_change(
                    name,
                    Delta::Modified {
                        old: (*old_table).clone(),
                        new: (*new_table).clone(),
                    },
                    format!(
                        "Table '{name}' moved from schema '{}' to '{}'",
                        old_table.schema, new_table.schema
                    ),
                ));
            }

            diff_columns(old_table, new_table, &mut changes.column_changes);
            diff_indexes(old_table, new_table, &mut changes.index_changes);
            diff_relationships(old_table, new_table, &mut changes.relationship_changes);
        }

        if changes.has_changes() {
            let summary = changes.summary();
            tracing::info!(
                total = changes.total_changes(),
                tables = changes.table_changes.len(),
                columns = changes.column_changes.len(),
                indexes = changes.index_changes.len(),
                relationships = changes.relationship_changes.len(),
                added = summary.added,
                removed = summary.removed,
                modified = summary.modified,
                "schema changes detected"
            );
        } else {
            tracing::debug!("no schema changes detected");
        }

        changes
    }
}

/// Name-keyed view that keeps the first occurrence of a duplicated key.
fn keyed<T>(items: &[T], key: impl Fn(&T) -> String) -> IndexMap<String, &T> {
    let mut map = IndexMap::with_capacity(items.len());
    for item in items {
        let k = key(item);
        if map.contains_key(&k) {
            tracing::warn!(name = %k, "duplicate schema element ignored");
            continue;
        }
        map.insert(k, item);
    }
    map
}

fn table_change(name: &str, delta: Delta<Table>, description: String) -> TableChange {
    SchemaChange {
        table_name: name.to_string(),
        name: name.to_string(),
        delta,
        description,
    }
}

/// Shared added/removed/modified walk over one keyed collection.
fn diff_keyed<T: Clone>(
    table_name: &str,
    old: IndexMap<String, &T>,
    new: IndexMap<String, &T>,
    modified: impl Fn(&T, &T) -> Option<String>,
    describe_added: impl Fn(&str) -> String,
    describe_removed: impl Fn(&str) -> String,
    out: &mut Vec<SchemaChange<T>>,
) {
    for (name, item) in &new {
        match old.get(name) {
            None => out.push(SchemaChange {
                table_name: table_name.to_string(),
                name: name.clone(),
                delta: Delta::Added {
                    new: (*item).clone(),
                },
                description: describe_added(name),
            }),
            Some(previous) => {
                if let Some(description) = modified(previous, item) {
                    out.push(SchemaChange {
                        table_name: table_name.to_string(),
                        name: name.clone(),
                        delta: Delta::Modified {
                            old: (*previous).clone(),
                            new: (*item).clone(),
                        },
                        description,
                    });
                }
            }
        }
    }

    for (name, item) in &old {
        if !new.contains_key(name) {
            out.push(SchemaChange {
                table_name: table_name.to_string(),
                name: name.clone(),
                delta: Delta::Removed {
                    old: (*item).clone(),
                },
                description: describe_removed(name),
            });
        }
    }
}

fn diff_columns(old: &Table, new: &Table, out: &mut Vec<ColumnChange>) {
    let table = new.name.as_str();
    diff_keyed(
        table,
        keyed(&old.columns, |c: &Column| c.name.clone()),
        keyed(&new.columns, |c: &Column| c.name.clone()),
        |before, after| {
            let facets = before.structural_differences(after);
            (!facets.is_empty()).then(|| {
                format!(
                    "Column '{table}.{}' modified: {}",
                    after.name,
                    facets.join(", ")
                )
            })
        },
        |name| format!("Column '{table}.{name}' was added"),
        |name| format!("Column '{table}.{name}' was removed"),
        out,
    );
}

fn diff_indexes(old: &Table, new: &Table, out: &mut Vec<IndexChange>) {
    let table = new.name.as_str();
    diff_keyed(
        table,
        keyed(&old.indexes, |i: &Index| i.name.clone()),
        keyed(&new.indexes, |i: &Index| i.name.clone()),
        |before, after| {
            let mut facets = Vec::new();
            if before.columns != after.columns {
                facets.push(format!(
                    "columns changed: ({}) → ({})",
                    before.columns.join(", "),
                    after.columns.join(", ")
                ));
            }
            if before.is_unique != after.is_unique {
                facets.push(format!(
                    "uniqueness changed: {} → {}",
                    before.is_unique, after.is_unique
                ));
            }
            (!facets.is_empty()).then(|| {
                format!(
                    "Index '{}' on '{table}' modified: {}",
                    after.name,
                    facets.join(", ")
                )
            })
        },
        |name| format!("Index '{name}' was added on '{table}'"),
        |name| format!("Index '{name}' was removed from '{table}'"),
        out,
    );
}

fn diff_relationships(old: &Table, new: &Table, out: &mut Vec<RelationshipChange>) {
    let table = new.name.as_str();
    let new_by_key = keyed(&new.relationships, Relationship::key);
    let old_by_key = keyed(&old.relationships, Relationship::key);

    // Descriptions use endpoints, which are stable even for named constraints.
    let endpoints = |name: &str| {
        new_by_key
            .get(name)
            .or_else(|| old_by_key.get(name))
            .map(|r| r.endpoints())
            .unwrap_or_else(|| name.to_string())
    };

    diff_keyed(
        table,
        old_by_key.clone(),
        new_by_key.clone(),
        |before, after| {
            let mut facets = Vec::new();
            if before.endpoints() != after.endpoints() {
                facets.push(format!(
                    "endpoints changed: {} → {}",
                    before.endpoints(),
                    after.endpoints()
                ));
            }
            if before.cardinality != after.cardinality {
                facets.push(format!(
                    "cardinality changed: {} → {}",
                    before.cardinality, after.cardinality
                ));
            }
            (!facets.is_empty()).then(|| {
                format!(
                    "Relationship modified: {} ({})",
                    after.key(),
                    facets.join(", ")
                )
            })
        },
        |name| format!("Relationship added: {}", endpoints(name)),
        |name| format!("Relationship removed: {}", endpoints(name)),
        out,
    );
}
