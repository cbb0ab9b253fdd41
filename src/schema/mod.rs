//! Schema snapshot model and its persistence.

pub mod model;
pub mod properties;
pub mod store;

pub use model::{Cardinality, Column, DEFAULT_SCHEMA, Index, Relationship, SchemaSnapshot, Table};
pub use properties::ExtendedProperties;
pub use store::SnapshotStore;
