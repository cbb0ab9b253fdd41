use crate::schema::SchemaSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum TableChangeType {
    New,
    Modified,
    Unchanged,
}

/// Hash comparison of one table against the previously recorded hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableChangeDetection {
    pub table_name: String,
    pub change_type: TableChangeType,
    pub current_hash: String,
    pub previous_hash: Option<String>,
}

impl TableChangeDetection {
    pub fn has_changed(&self) -> bool {
        self.change_type != TableChangeType::Unchanged
    }

    /// Compare every table in `snapshot` with `previous_hashes`. Tables with
    /// no previous hash, or an empty one, count as new.
    pub fn detect(
        snapshot: &SchemaSnapshot,
        previous_hashes: &BTreeMap<String, String>,
    ) -> Vec<TableChangeDetection> {
        snapshot
            .table_hashes()
            .into_iter()
            .map(|(table_name, current_hash)| {
                let previous_hash = previous_hashes
                    .get(&table_name)
                    .filter(|h| !h.is_empty())
                    .cloned();
                let change_type = match previous_hash.as_deref() {
                    None => TableChangeType::New,
                    Some(previous) if hash_changed(&current_hash, previous) => {
                        TableChangeType::Modified
                    }
                    Some(_) => TableChangeType::Unchanged,
                };
                TableChangeDetection {
                    table_name,
                    change_type,
                    current_hash,
                    previous_hash,
                }
            })
            .collect()
    }
}

/// Whether a table's hash differs from a previously recorded one. An empty
/// previous hash always counts as changed.
pub fn hash_changed(current: &str, previous: &str) -> bool {
    previous.is_empty() || current != previous
}
