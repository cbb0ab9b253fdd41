//! Persisted generation tracking record.
//!
//! Field names are PascalCase so documents written by earlier tooling
//! (`.targcc/generated.json`) load unchanged.

use crate::guards::is_protected_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerationTrackingRecord {
    #[serde(default)]
    pub tables: BTreeMap<String, TableGenerationInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableGenerationInfo {
    pub last_generated: DateTime<Utc>,
    /// Hash carried by the most recently tracked file of this table
    pub schema_hash: String,
    #[serde(default)]
    pub files: Vec<GeneratedFileInfo>,
}

impl TableGenerationInfo {
    pub fn files_of_type<'a>(
        &'a self,
        artifact_type: &'a str,
    ) -> impl Iterator<Item = &'a GeneratedFileInfo> + 'a {
        self.files
            .iter()
            .filter(move |f| f.artifact_type == artifact_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeneratedFileInfo {
    pub table_name: String,
    pub file_path: PathBuf,
    /// Entity, Repository, SQL, ...
    #[serde(rename = "FileType")]
    pub artifact_type: String,
    pub generated_at: DateTime<Utc>,
    pub schema_hash: String,
    #[serde(default)]
    pub is_manual: bool,
}

impl GeneratedFileInfo {
    /// Describe a file generated now. `is_manual` follows the file protection
    /// marker of `file_path`.
    pub fn new(
        table_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        artifact_type: impl Into<String>,
        schema_hash: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        Self {
            table_name: table_name.into(),
            is_manual: is_protected_path(&file_path),
            file_path,
            artifact_type: artifact_type.into(),
            generated_at: Utc::now(),
            schema_hash: schema_hash.into(),
        }
    }

    pub fn generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn manual(mut self, is_manual: bool) -> Self {
        self.is_manual = is_manual;
        self
    }
}

impl GenerationTrackingRecord {
    /// Insert or replace `file` under its table. A file with the same path is
    /// replaced, and the table's timestamp and hash follow the incoming file.
    pub(crate) fn track(&mut self, file: GeneratedFileInfo) {
        let table = self
            .tables
            .entry(file.table_name.clone())
            .or_insert_with(|| TableGenerationInfo {
                last_generated: file.generated_at,
                schema_hash: file.schema_hash.clone(),
                files: Vec::new(),
            });

        table.last_generated = file.generated_at;
        table.schema_hash = file.schema_hash.clone();
        table.files.retain(|f| f.file_path != file.file_path);
        table.files.push(file);
    }

    /// Table name to the hash it was last generated with.
    pub fn table_hashes(&self) -> BTreeMap<String, String> {
        self.tables
            .iter()
            .map(|(name, info)| (name.clone(), info.schema_hash.clone()))
            .collect()
    }
}
