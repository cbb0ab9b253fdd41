//! Generation Tracker Integration Tests
//!
//! Each test owns a temporary project directory and its own tracker handle,
//! so no state is shared between tests.

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use std::path::Path;
use targcc_engine::codegen::{
    GeneratedFileInfo, GenerationTracker, GenerationTrackingRecord, RegenerationReason,
    RegenerationStatus, TRACKING_DIR, TRACKING_FILE,
};
use targcc_engine::error::EngineError;
use tempfile::TempDir;

fn project() -> (TempDir, GenerationTracker) {
    let dir = tempfile::tempdir().unwrap();
    let tracker = GenerationTracker::for_project(dir.path());
    (dir, tracker)
}

/// Create `name` under the project and describe it as generated with `hash`.
fn generated(dir: &Path, table: &str, name: &str, artifact_type: &str, hash: &str) -> GeneratedFileInfo {
    let path = dir.join(name);
    std::fs::write(&path, "// generated").unwrap();
    GeneratedFileInfo::new(table, path, artifact_type, hash)
}

// =============================================================================
// Regeneration decisions
// =============================================================================

#[tokio::test]
async fn test_untracked_table_needs_generation() {
    let (_dir, tracker) = project();

    let status = tracker
        .regeneration_status("Customer", "Entity", "H1")
        .await
        .unwrap();

    assert_eq!(status, RegenerationStatus::Required(RegenerationReason::NewTable));
    assert!(!tracker.storage_path().exists());
}

#[tokio::test]
async fn test_identical_schema_regenerates_nothing() {
    let (dir, tracker) = project();
    for (name, artifact_type) in [
        ("Customer.cs", "Entity"),
        ("CustomerRepository.cs", "Repository"),
        ("Customer.sql", "SQL"),
    ] {
        tracker
            .track_generated_file(generated(dir.path(), "Customer", name, artifact_type, "H1"))
            .await
            .unwrap();
    }

    for artifact_type in ["Entity", "Repository", "SQL"] {
        assert!(
            !tracker
                .needs_regeneration("Customer", artifact_type, "H1")
                .await
                .unwrap(),
            "{artifact_type}"
        );
    }
}

#[tokio::test]
async fn test_manual_file_blocks_regeneration_after_schema_change() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.prt.cs", "Entity", "H1"))
        .await
        .unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.sql", "SQL", "H1"))
        .await
        .unwrap();

    assert!(!tracker.needs_regeneration("Customer", "Entity", "H2").await.unwrap());
    assert!(tracker.needs_regeneration("Customer", "SQL", "H2").await.unwrap());
    assert_eq!(
        tracker.regeneration_status("Customer", "Entity", "H2").await.unwrap(),
        RegenerationStatus::Manual { schema_changed: true }
    );
}

#[tokio::test]
async fn test_missing_artifact_type_and_missing_file() {
    let (dir, tracker) = project();
    let info = generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1");
    let path = info.file_path.clone();
    tracker.track_generated_file(info).await.unwrap();

    assert_eq!(
        tracker.regeneration_status("Customer", "Repository", "H1").await.unwrap(),
        RegenerationStatus::Required(RegenerationReason::MissingArtifact)
    );

    std::fs::remove_file(&path).unwrap();
    assert_eq!(
        tracker.regeneration_status("Customer", "Entity", "H1").await.unwrap(),
        RegenerationStatus::Required(RegenerationReason::FileMissing)
    );
}

#[tokio::test]
async fn test_table_hash_decides_for_every_artifact() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.sql", "SQL", "H2"))
        .await
        .unwrap();

    // The last tracked file moved the table's stored hash to H2.
    let record = tracker.record().await.unwrap();
    assert_eq!(record.tables["Customer"].schema_hash, "H2");

    assert_eq!(
        tracker.regeneration_status("Customer", "Entity", "H2").await.unwrap(),
        RegenerationStatus::UpToDate
    );
    assert!(!tracker.needs_regeneration("Customer", "SQL", "H2").await.unwrap());
    assert_eq!(
        tracker.regeneration_status("Customer", "Entity", "H1").await.unwrap(),
        RegenerationStatus::Required(RegenerationReason::SchemaChanged)
    );
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_record_round_trips_through_disk() {
    let (dir, tracker) = project();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1").generated_at(at))
        .await
        .unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Order", "Order.sql", "SQL", "H7").generated_at(at))
        .await
        .unwrap();

    let reopened = GenerationTracker::for_project(dir.path());
    assert_eq!(reopened.record().await.unwrap(), tracker.record().await.unwrap());
    assert_eq!(
        reopened.get_last_generation_time("Customer").await.unwrap(),
        Some(at)
    );
    assert_eq!(reopened.tracked_tables().await.unwrap(), vec!["Customer", "Order"]);
}

#[tokio::test]
async fn test_document_layout_is_stable() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();

    let path = dir.path().join(TRACKING_DIR).join(TRACKING_FILE);
    assert_eq!(tracker.storage_path(), path);
    let raw = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    let file = &json["Tables"]["Customer"]["Files"][0];
    assert_eq!(file["TableName"], "Customer");
    assert_eq!(file["FileType"], "Entity");
    assert_eq!(file["SchemaHash"], "H1");
    assert_eq!(file["IsManual"], false);
    assert_eq!(json["Tables"]["Customer"]["SchemaHash"], "H1");
    // Indented output
    assert!(raw.contains("\n  "));
}

#[tokio::test]
async fn test_existing_document_is_read() {
    let (_dir, tracker) = project();
    let path = tracker.storage_path().to_path_buf();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"{
  "Tables": {
    "Invoice": {
      "LastGenerated": "2024-03-01T08:30:00Z",
      "SchemaHash": "abc",
      "Files": [
        {
          "TableName": "Invoice",
          "FilePath": "Invoice.prt.cs",
          "FileType": "Entity",
          "GeneratedAt": "2024-03-01T08:30:00Z",
          "SchemaHash": "abc",
          "IsManual": true
        }
      ]
    }
  }
}"#,
    )
    .unwrap();

    let files = tracker.get_generated_files("Invoice").await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].is_manual);
    assert!(!tracker.needs_regeneration("Invoice", "Entity", "changed").await.unwrap());
}

#[tokio::test]
async fn test_corrupt_document_degrades_to_empty_record() {
    let (dir, tracker) = project();
    let path = tracker.storage_path().to_path_buf();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(tracker.record().await.unwrap(), GenerationTrackingRecord::default());
    assert!(tracker.needs_regeneration("Customer", "Entity", "H1").await.unwrap());

    // The next mutation replaces the corrupt document.
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();
    let reopened = GenerationTracker::for_project(dir.path());
    assert_eq!(reopened.tracked_tables().await.unwrap(), vec!["Customer"]);
}

#[tokio::test]
async fn test_reload_picks_up_external_changes() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();

    let other = GenerationTracker::for_project(dir.path());
    other.clear_all().await.unwrap();

    assert_eq!(tracker.tracked_tables().await.unwrap(), vec!["Customer"]);
    tracker.reload().await;
    assert!(tracker.tracked_tables().await.unwrap().is_empty());
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_tracking_same_path_replaces_entry() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H2"))
        .await
        .unwrap();

    let files = tracker.get_generated_files("Customer").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].schema_hash, "H2");
}

#[tokio::test]
async fn test_clear_tracking_forgets_one_table() {
    let (dir, tracker) = project();
    tracker
        .track_generated_file(generated(dir.path(), "Customer", "Customer.cs", "Entity", "H1"))
        .await
        .unwrap();
    tracker
        .track_generated_file(generated(dir.path(), "Order", "Order.cs", "Entity", "H1"))
        .await
        .unwrap();

    tracker.clear_tracking("Customer").await.unwrap();
    tracker.clear_tracking("Ghost").await.unwrap();

    assert_eq!(tracker.tracked_tables().await.unwrap(), vec!["Order"]);
    assert!(tracker.get_generated_files("Customer").await.unwrap().is_empty());
    assert_eq!(tracker.get_last_generation_time("Customer").await.unwrap(), None);
    assert_eq!(tracker.all_generated_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_contract_violations_fail_fast() {
    let (dir, tracker) = project();

    assert_matches!(
        tracker
            .track_generated_file(GeneratedFileInfo::new("", dir.path().join("a.cs"), "Entity", "H1"))
            .await,
        Err(EngineError::InvalidArgument { parameter: "table_name", .. })
    );
    assert_matches!(
        tracker.clear_tracking("").await,
        Err(EngineError::InvalidArgument { .. })
    );
    assert_matches!(
        tracker.get_generated_files(" ").await,
        Err(EngineError::InvalidArgument { .. })
    );
}
