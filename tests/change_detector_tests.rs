//! Schema Change Detector Integration Tests
//!
//! Diffs realistic snapshot pairs and checks both the typed deltas and the
//! human-readable descriptions generators show to users.

use std::collections::BTreeMap;
use targcc_engine::changes::{
    ChangeKind, Delta, SchemaChangeDetector, TableChangeDetection, TableChangeType, hash_changed,
};
use targcc_engine::schema::{Cardinality, Column, Index, Relationship, SchemaSnapshot, Table};

fn snapshot(tables: Vec<Table>) -> SchemaSnapshot {
    SchemaSnapshot {
        captured_at: None,
        tables,
    }
}

fn customer() -> Table {
    Table::new("Customer")
        .column(Column::new("ID", "int").primary_key())
        .column(Column::new("Name", "nvarchar").max_length(100))
        .column(Column::new("Email", "nvarchar").max_length(255).nullable(true))
        .index(Index::new("IX_Customer_Email", ["Email"], true))
}

fn order() -> Table {
    Table::new("Order")
        .column(Column::new("ID", "int").primary_key())
        .column(Column::new("CustomerID", "int").foreign_key("Customer"))
        .relationship(Relationship::new("Order", "CustomerID", "Customer", "ID"))
}

// =============================================================================
// Equality
// =============================================================================

#[test]
fn test_equal_snapshots_produce_empty_change_set() {
    let old = snapshot(vec![customer(), order()]);
    let new = old.clone();

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert!(!changes.has_changes());
    assert_eq!(changes.total_changes(), 0);
    assert!(changes.descriptions().is_empty());
}

#[test]
fn test_missing_previous_snapshot_yields_no_changes() {
    let detector = SchemaChangeDetector::new();
    let current = snapshot(vec![customer(), order()]);

    let changes = detector.detect_changes(None, &current);
    assert!(!changes.has_changes());
    assert_eq!(changes.total_changes(), 0);

    let previous = snapshot(vec![customer()]);
    let changes = detector.detect_changes(Some(&previous), &current);
    assert_eq!(changes, detector.diff(&previous, &current));
    assert_eq!(changes.table_changes.len(), 1);
}

#[test]
fn test_capture_time_is_not_a_change() {
    let old = SchemaSnapshot::new(vec![customer()]);
    let mut new = old.clone();
    new.captured_at = None;

    assert!(!SchemaChangeDetector::new().diff(&old, &new).has_changes());
}

// =============================================================================
// Tables
// =============================================================================

#[test]
fn test_table_added_and_removed() {
    let old = snapshot(vec![customer()]);
    let new = snapshot(vec![order()]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.table_changes.len(), 2);
    let added = &changes.table_changes[0];
    assert_eq!(added.kind(), ChangeKind::Added);
    assert_eq!(added.description, "Table 'Order' was added");
    assert!(added.old_value().is_none());
    assert_eq!(added.new_value().map(|t| t.name.as_str()), Some("Order"));

    let removed = &changes.table_changes[1];
    assert_eq!(removed.kind(), ChangeKind::Removed);
    assert_eq!(removed.description, "Table 'Customer' was removed");
    assert!(removed.new_value().is_none());

    // Columns of added/removed tables are not reported individually.
    assert!(changes.column_changes.is_empty());
}

#[test]
fn test_schema_move_is_a_table_modification() {
    let old = snapshot(vec![customer()]);
    let new = snapshot(vec![customer().in_schema("sales")]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.total_changes(), 1);
    match &changes.table_changes[0].delta {
        Delta::Modified { old, new } => {
            assert_eq!(old.schema, "dbo");
            assert_eq!(new.schema, "sales");
        }
        other => panic!("expected a modification, got {other:?}"),
    }
}

// =============================================================================
// Columns
// =============================================================================

#[test]
fn test_column_modification_lists_facets() {
    let old = snapshot(vec![
        Table::new("Invoice")
            .column(Column::new("Total", "int").nullable(true))
            .column(Column::new("Notes", "nvarchar").max_length(200)),
    ]);
    let new = snapshot(vec![
        Table::new("Invoice")
            .column(Column::new("Total", "bigint"))
            .column(Column::new("Notes", "nvarchar").max_length(-1)),
    ]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.column_changes.len(), 2);
    assert_eq!(
        changes.column_changes[0].description,
        "Column 'Invoice.Total' modified: type changed: int → bigint, nullability changed: NULL → NOT NULL"
    );
    assert_eq!(
        changes.column_changes[1].description,
        "Column 'Invoice.Notes' modified: length changed: 200 → MAX"
    );
    assert!(
        changes
            .column_changes
            .iter()
            .all(|c| c.old_value().is_some() && c.new_value().is_some())
    );
}

#[test]
fn test_column_added_and_removed() {
    let old = snapshot(vec![customer()]);
    let mut trimmed = customer();
    trimmed.columns.retain(|c| c.name != "Email");
    let new = snapshot(vec![
        trimmed.column(Column::new("Phone", "varchar").max_length(20)),
    ]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);
    let descriptions = changes.descriptions();

    assert!(descriptions.contains(&"Column 'Customer.Phone' was added".to_string()));
    assert!(descriptions.contains(&"Column 'Customer.Email' was removed".to_string()));
    assert!(descriptions.contains(&"Index 'IX_Customer_Email' was removed from 'Customer'".to_string()));
}

#[test]
fn test_column_names_compare_case_sensitively() {
    let old = snapshot(vec![Table::new("T").column(Column::new("Name", "int"))]);
    let new = snapshot(vec![Table::new("T").column(Column::new("NAME", "int"))]);

    let summary = SchemaChangeDetector::new().diff(&old, &new).summary();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
}

// =============================================================================
// Indexes and relationships
// =============================================================================

#[test]
fn test_index_uniqueness_change() {
    let old = snapshot(vec![customer()]);
    let mut new_table = customer();
    new_table.indexes[0].is_unique = false;
    let new = snapshot(vec![new_table]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.index_changes.len(), 1);
    assert_eq!(changes.index_changes[0].kind(), ChangeKind::Modified);
    assert!(changes.index_changes[0].description.contains("uniqueness changed: true → false"));
}

#[test]
fn test_relationship_added_uses_endpoints() {
    let old = snapshot(vec![customer(), Table::new("Order").column(Column::new("ID", "int"))]);
    let new = snapshot(vec![customer(), order()]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.relationship_changes.len(), 1);
    assert_eq!(
        changes.relationship_changes[0].description,
        "Relationship added: Order.CustomerID->Customer.ID"
    );
}

#[test]
fn test_named_relationship_cardinality_change() {
    let rel = Relationship::new("Order", "CustomerID", "Customer", "ID").named("FK_Order_Customer");
    let old = snapshot(vec![order().relationship(rel.clone())]);
    let new = snapshot(vec![
        order().relationship(rel.with_cardinality(Cardinality::OneToOne)),
    ]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);

    assert_eq!(changes.relationship_changes.len(), 1);
    let change = &changes.relationship_changes[0];
    assert_eq!(change.name, "FK_Order_Customer");
    assert_eq!(change.kind(), ChangeKind::Modified);
}

// =============================================================================
// Per-table filtering and hash detection
// =============================================================================

#[test]
fn test_changes_for_table_filters_every_list() {
    let old = snapshot(vec![customer(), order()]);
    let mut changed_order = order();
    changed_order.columns.push(Column::new("Total", "decimal"));
    let new = snapshot(vec![customer().in_schema("crm"), changed_order]);

    let changes = SchemaChangeDetector::new().diff(&old, &new);
    let for_order = changes.changes_for_table("Order");

    assert_eq!(changes.total_changes(), 2);
    assert_eq!(for_order.total_changes(), 1);
    assert_eq!(for_order.column_changes[0].name, "Total");
}

#[test]
fn test_hash_detection_against_recorded_hashes() {
    let current = snapshot(vec![customer(), order()]);
    let mut recorded = BTreeMap::new();
    recorded.insert("Customer".to_string(), customer().content_hash());
    recorded.insert("Order".to_string(), String::new());

    let detections = TableChangeDetection::detect(&current, &recorded);

    let by_name: BTreeMap<_, _> = detections
        .iter()
        .map(|d| (d.table_name.as_str(), d.change_type))
        .collect();
    assert_eq!(by_name["Customer"], TableChangeType::Unchanged);
    assert_eq!(by_name["Order"], TableChangeType::New);

    assert!(hash_changed("abc", ""));
    assert!(hash_changed("abc", "def"));
    assert!(!hash_changed("abc", "abc"));
}

#[test]
fn test_content_hash_ignores_raw_properties_but_not_roles() {
    let plain = Table::new("T").column(Column::new("Amount", "decimal"));
    let described = Table::new("T").column(Column::new("Amount", "decimal").property("MS_Description", "total"));
    assert_eq!(plain.content_hash(), described.content_hash());

    let mut annotated = Table::new("T").column(Column::new("Amount", "decimal").property("type-override", "clc"));
    targcc_engine::ConventionResolver::new().annotate(&mut annotated.columns[0]);
    assert_ne!(plain.content_hash(), annotated.content_hash());
}
