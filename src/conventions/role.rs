//! Semantic column roles and their token table.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// Semantic role of a column, derived from its name prefix or an explicit
/// override token.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumIter,
)]
pub enum ColumnRole {
    #[default]
    None,
    OneWayEncryption,
    TwoWayEncryption,
    Lookup,
    Enumeration,
    Localized,
    Calculated,
    BusinessLogic,
    Aggregate,
    SeparateUpdate,
    Upload,
    FakeUniqueIndex,
    SeparateChangedBy,
    SeparateList,
}

/// Roles whose bare prefix (no trailing underscore) is still recognised in
/// column names.
pub(crate) const BARE_PREFIX_ROLES: [ColumnRole; 4] = [
    ColumnRole::OneWayEncryption,
    ColumnRole::TwoWayEncryption,
    ColumnRole::Lookup,
    ColumnRole::Enumeration,
];

impl ColumnRole {
    /// Three-letter token used both as a name prefix and as an override value.
    /// `None` has no token.
    pub fn token(&self) -> Option<&'static str> {
        let token = match self {
            ColumnRole::None => return None,
            ColumnRole::OneWayEncryption => "eno",
            ColumnRole::TwoWayEncryption => "ent",
            ColumnRole::Lookup => "lkp",
            ColumnRole::Enumeration => "enm",
            ColumnRole::Localized => "loc",
            ColumnRole::Calculated => "clc",
            ColumnRole::BusinessLogic => "blg",
            ColumnRole::Aggregate => "agg",
            ColumnRole::SeparateUpdate => "spt",
            ColumnRole::Upload => "upl",
            ColumnRole::FakeUniqueIndex => "fui",
            ColumnRole::SeparateChangedBy => "scb",
            ColumnRole::SeparateList => "spl",
        };
        Some(token)
    }

    /// Maps an override token to its role. Case and surrounding whitespace are
    /// ignored, as is a single trailing underscore (`enm_`). Unknown tokens map
    /// to `None`.
    pub fn from_token(token: &str) -> ColumnRole {
        let normalized = token.trim().to_ascii_lowercase();
        let normalized = normalized.strip_suffix('_').unwrap_or(&normalized);
        ColumnRole::iter()
            .find(|role| role.token() == Some(normalized))
            .unwrap_or(ColumnRole::None)
    }

    /// Roles whose generated members are never written by callers.
    pub fn implies_read_only(&self) -> bool {
        matches!(
            self,
            ColumnRole::BusinessLogic | ColumnRole::Calculated | ColumnRole::Aggregate
        )
    }

    pub fn implies_encryption(&self) -> bool {
        matches!(
            self,
            ColumnRole::OneWayEncryption | ColumnRole::TwoWayEncryption
        )
    }
}
