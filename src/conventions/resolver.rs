//! Precedence-ordered column classification.
//!
//! Resolution order:
//! 1. `type-override` extended property: the first comma-separated token decides the role
//! 2. Known name prefix at position 0 (case-insensitive)
//! 3. `ColumnRole::None`
//!
//! Resolution never fails. Malformed or unknown input degrades to `None`.

use super::role::{BARE_PREFIX_ROLES, ColumnRole};
use crate::schema::{Column, ExtendedProperties, SchemaSnapshot};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Extended property carrying a comma-separated role override token list.
pub const TYPE_OVERRIDE_KEY: &str = "type-override";
/// Extended property whose value `"1"` excludes the column from auditing.
pub const DO_NOT_AUDIT_KEY: &str = "do-not-audit";

/// Keys emitted by older schema annotations, consulted only when the
/// canonical key is absent.
const LEGACY_TYPE_OVERRIDE_KEY: &str = "ccType";
const LEGACY_DO_NOT_AUDIT_KEY: &str = "ccDNA";

/// Everything resolution derives from a column's (name, extended properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnConventions {
    pub role: ColumnRole,
    pub is_read_only: bool,
    pub is_encrypted: bool,
    pub do_not_audit: bool,
}

/// Stateless resolver over the fixed role token table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionResolver;

impl ConventionResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the semantic role for a column.
    pub fn resolve(&self, column_name: &str, properties: Option<&ExtendedProperties>) -> ColumnRole {
        if let Some(tokens) = override_tokens(properties) {
            // Only the first token names the role, even when later tokens
            // carry further implications.
            return tokens
                .first()
                .map(|token| ColumnRole::from_token(token))
                .unwrap_or(ColumnRole::None);
        }

        role_from_name(column_name)
    }

    /// Resolve the role together with every derived flag.
    ///
    /// `is_read_only` is the union of the role's implication and the
    /// implications of every override token, so `"blg,clc"` resolves to
    /// `BusinessLogic` while still honouring the `clc` read-only semantics.
    pub fn resolve_conventions(
        &self,
        column_name: &str,
        properties: Option<&ExtendedProperties>,
    ) -> ColumnConventions {
        let role = self.resolve(column_name, properties);

        let tokens_read_only = override_tokens(properties)
            .map(|tokens| {
                tokens
                    .iter()
                    .any(|token| ColumnRole::from_token(token).implies_read_only())
            })
            .unwrap_or(false);

        let do_not_audit = lookup(properties, DO_NOT_AUDIT_KEY, LEGACY_DO_NOT_AUDIT_KEY)
            .map(|value| value == "1")
            .unwrap_or(false);

        ColumnConventions {
            role,
            is_read_only: role.implies_read_only() || tokens_read_only,
            is_encrypted: role.implies_encryption(),
            do_not_audit,
        }
    }

    /// Overwrite a column's derived fields from its name and properties.
    pub fn annotate(&self, column: &mut Column) {
        let conventions = self.resolve_conventions(&column.name, Some(&column.extended_properties));
        column.apply_conventions(conventions);
    }

    /// Annotate every column of every table. Returns the number of columns
    /// that received a role other than `None`.
    pub fn annotate_snapshot(&self, snapshot: &mut SchemaSnapshot) -> usize {
        let mut classified = 0;
        for table in &mut snapshot.tables {
            for column in &mut table.columns {
                self.annotate(column);
                if column.role != ColumnRole::None {
                    classified += 1;
                }
            }
        }
        tracing::debug!(
            tables = snapshot.tables.len(),
            classified,
            "annotated schema snapshot"
        );
        classified
    }
}

fn lookup<'a>(
    properties: Option<&'a ExtendedProperties>,
    key: &str,
    legacy_key: &str,
) -> Option<&'a str> {
    let properties = properties?;
    properties.get(key).or_else(|| properties.get(legacy_key))
}

/// Trimmed tokens of the override property, or `None` when the property is
/// absent or blank and name inspection should apply. Only zero-length tokens
/// are dropped; a whitespace-only token survives as `""` and maps to no role.
fn override_tokens(properties: Option<&ExtendedProperties>) -> Option<Vec<&str>> {
    let value = lookup(properties, TYPE_OVERRIDE_KEY, LEGACY_TYPE_OVERRIDE_KEY)?;
    if value.trim().is_empty() {
        return None;
    }
    Some(
        value
            .split(',')
            .filter(|token| !token.is_empty())
            .map(str::trim)
            .collect(),
    )
}

fn role_from_name(column_name: &str) -> ColumnRole {
    let name = column_name.as_bytes();
    let has_prefix = |token: &str, separator: bool| {
        let token = token.as_bytes();
        let len = token.len() + usize::from(separator);
        name.len() >= len
            && name[..token.len()].eq_ignore_ascii_case(token)
            && (!separator || name[token.len()] == b'_')
    };

    ColumnRole::iter()
        .find(|role| role.token().is_some_and(|token| has_prefix(token, true)))
        .or_else(|| {
            BARE_PREFIX_ROLES
                .into_iter()
                .find(|role| role.token().is_some_and(|token| has_prefix(token, false)))
        })
        .unwrap_or(ColumnRole::None)
}
