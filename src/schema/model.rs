//! Schema snapshot model
//!
//! A `SchemaSnapshot` is produced once per run by the external introspector
//! and treated as immutable once conventions are applied. Every `Table`
//! exposes a content hash over its structural definition which gates
//! regeneration.

use crate::conventions::{ColumnConventions, ColumnRole};
use crate::schema::ExtendedProperties;
use crate::utils::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

pub const DEFAULT_SCHEMA: &str = "dbo";

// =============================================================================
// Column
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Raw SQL type name as reported by the catalog
    pub data_type: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    /// `None` for unbounded or non-character types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(default, skip_serializing_if = "ExtendedProperties::is_empty")]
    pub extended_properties: ExtendedProperties,

    // Derived by the convention resolver; never set by hand.
    #[serde(default)]
    pub role: ColumnRole,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub do_not_audit: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: false,
            is_primary_key: false,
            is_foreign_key: false,
            referenced_table: None,
            max_length: None,
            extended_properties: ExtendedProperties::new(),
            role: ColumnRole::None,
            is_read_only: false,
            is_encrypted: false,
            do_not_audit: false,
        }
    }

    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn foreign_key(mut self, referenced_table: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.referenced_table = Some(referenced_table.into());
        self
    }

    pub fn max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extended_properties.insert(key, value);
        self
    }

    pub fn apply_conventions(&mut self, conventions: ColumnConventions) {
        self.role = conventions.role;
        self.is_read_only = conventions.is_read_only;
        self.is_encrypted = conventions.is_encrypted;
        self.do_not_audit = conventions.do_not_audit;
    }

    pub fn conventions(&self) -> ColumnConventions {
        ColumnConventions {
            role: self.role,
            is_read_only: self.is_read_only,
            is_encrypted: self.is_encrypted,
            do_not_audit: self.do_not_audit,
        }
    }

    /// Facets compared by the change detector, in display order.
    pub(crate) fn structural_differences(&self, other: &Column) -> Vec<String> {
        let mut facets = Vec::new();
        if self.data_type != other.data_type {
            facets.push(format!(
                "type changed: {} → {}",
                self.data_type, other.data_type
            ));
        }
        if self.max_length != other.max_length {
            facets.push(format!(
                "length changed: {} → {}",
                display_length(self.max_length),
                display_length(other.max_length)
            ));
        }
        if self.is_nullable != other.is_nullable {
            facets.push(format!(
                "nullability changed: {} → {}",
                display_nullability(self.is_nullable),
                display_nullability(other.is_nullable)
            ));
        }
        if self.is_primary_key != other.is_primary_key {
            facets.push(format!(
                "primary key changed: {} → {}",
                self.is_primary_key, other.is_primary_key
            ));
        }
        if self.is_foreign_key != other.is_foreign_key {
            facets.push(format!(
                "foreign key changed: {} → {}",
                self.is_foreign_key, other.is_foreign_key
            ));
        }
        if self.referenced_table != other.referenced_table {
            facets.push(format!(
                "referenced table changed: {} → {}",
                self.referenced_table.as_deref().unwrap_or("none"),
                other.referenced_table.as_deref().unwrap_or("none")
            ));
        }
        facets
    }
}

fn display_length(length: Option<i32>) -> String {
    match length {
        Some(-1) => "MAX".to_string(),
        Some(n) => n.to_string(),
        None => "none".to_string(),
    }
}

fn display_nullability(is_nullable: bool) -> &'static str {
    if is_nullable { "NULL" } else { "NOT NULL" }
}

// =============================================================================
// Index / Relationship
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub is_unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I, is_unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            is_unique,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum Cardinality {
    OneToOne,
    #[default]
    OneToMany,
    ManyToOne,
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Constraint name; unnamed relationships are identified by their endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl Relationship {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            source_table: source_table.into(),
            source_columns: vec![source_column.into()],
            target_table: target_table.into(),
            target_columns: vec![target_column.into()],
            cardinality: Cardinality::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Identity used when diffing: the constraint name, or
    /// `Source.col->Target.col` when unnamed.
    pub fn key(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.endpoints(),
        }
    }

    pub fn endpoints(&self) -> String {
        format!(
            "{}.{}->{}.{}",
            self.source_table,
            self.source_columns.join(","),
            self.target_table,
            self.target_columns.join(",")
        )
    }
}

// =============================================================================
// Table
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

/// Borrowed view of the fields that participate in the content hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableHashView<'a> {
    table_name: &'a str,
    schema_name: &'a str,
    columns: Vec<ColumnHashView<'a>>,
    indexes: &'a [Index],
    relationships: &'a [Relationship],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnHashView<'a> {
    ordinal: usize,
    name: &'a str,
    data_type: &'a str,
    is_nullable: bool,
    is_primary_key: bool,
    is_foreign_key: bool,
    referenced_table: Option<&'a str>,
    max_length: Option<i32>,
    role: ColumnRole,
    is_read_only: bool,
    is_encrypted: bool,
    do_not_audit: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            columns: Vec::new(),
            indexes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// SHA-256 over the canonical JSON of the table's structural definition.
    ///
    /// Extended properties contribute only through the role and flags they
    /// resolve to, so re-annotating an unchanged table never alters the hash.
    pub fn content_hash(&self) -> String {
        let view = TableHashView {
            table_name: &self.name,
            schema_name: &self.schema,
            columns: self
                .columns
                .iter()
                .enumerate()
                .map(|(ordinal, c)| ColumnHashView {
                    ordinal,
                    name: &c.name,
                    data_type: &c.data_type,
                    is_nullable: c.is_nullable,
                    is_primary_key: c.is_primary_key,
                    is_foreign_key: c.is_foreign_key,
                    referenced_table: c.referenced_table.as_deref(),
                    max_length: c.max_length,
                    role: c.role,
                    is_read_only: c.is_read_only,
                    is_encrypted: c.is_encrypted,
                    do_not_audit: c.do_not_audit,
                })
                .collect(),
            indexes: &self.indexes,
            relationships: &self.relationships,
        };

        // Serializing plain structs of strings, bools and integers cannot fail.
        let canonical = serde_json::to_vec(&view).unwrap_or_default();
        sha256_hex(canonical)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            captured_at: Some(Utc::now()),
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Table name to content hash. The first occurrence of a duplicated name wins.
    pub fn table_hashes(&self) -> BTreeMap<String, String> {
        let mut hashes = BTreeMap::new();
        for table in &self.tables {
            hashes
                .entry(table.name.clone())
                .or_insert_with(|| table.content_hash());
        }
        hashes
    }
}
