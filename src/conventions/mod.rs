//! Convention resolution: classifies schema columns into semantic roles.

pub mod resolver;
pub mod role;

pub use resolver::{ColumnConventions, ConventionResolver, DO_NOT_AUDIT_KEY, TYPE_OVERRIDE_KEY};
pub use role::ColumnRole;
