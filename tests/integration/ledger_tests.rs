//! Coverage ledger tests.
//!
//! Covers export idempotence, reload of exported documents, and the
//! all-or-nothing behaviour of writing the document to disk.

use std::fs;

use wsi_tiler::error::{LedgerError, SchemaError};
use wsi_tiler::ledger::{document_name, parse_document, CoverageLedger};
use wsi_tiler::tile::{PlannerConfig, TilePlanner, TileRect};

use super::test_utils::mask_with;

fn planned_ledger(slide_id: &str) -> CoverageLedger {
    let mask = mask_with(96, 96, &[(3, 3), (50, 10), (90, 90), (10, 70)]);
    let tiles = TilePlanner::new(PlannerConfig::new(32))
        .unwrap()
        .plan(&mask)
        .unwrap();

    let ledger = CoverageLedger::new();
    for (id, rect) in tiles.into_iter().enumerate() {
        ledger.record(slide_id, id as u64, rect).unwrap();
    }
    ledger
}

#[test]
fn test_export_round_trip_reproduces_rectangles() {
    let ledger = planned_ledger("slide");
    let doc = ledger.export("slide");

    let parsed = parse_document(&doc).unwrap();
    let entries: Vec<(u64, TileRect)> = parsed.into_iter().collect();
    assert_eq!(entries, ledger.entries("slide"));

    let reloaded = CoverageLedger::from_document("slide", &doc).unwrap();
    assert_eq!(reloaded.export("slide"), doc);
}

#[test]
fn test_export_to_path_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(document_name("A_P000002_PAS_CPG"));
    let ledger = planned_ledger("A_P000002_PAS_CPG");

    let first = ledger.export_to_path("A_P000002_PAS_CPG", &path).unwrap();
    let bytes_first = fs::read(&path).unwrap();
    let second = ledger.export_to_path("A_P000002_PAS_CPG", &path).unwrap();
    let bytes_second = fs::read(&path).unwrap();

    assert_eq!(bytes_first, bytes_second);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(first.patches, 4);
    assert!(path.ends_with("A_P000002_PAS_CPG_patches.xml"));
}

#[test]
fn test_failed_export_keeps_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide_patches.xml");
    let ledger = planned_ledger("slide");
    ledger.export_to_path("slide", &path).unwrap();
    let before = fs::read(&path).unwrap();

    // The temporary sibling cannot be created when a directory occupies its name
    fs::create_dir(dir.path().join("slide_patches.xml.tmp")).unwrap();
    ledger.record("slide", 99, TileRect::new(64, 0, 96, 32)).unwrap();
    let result = ledger.export_to_path("slide", &path);

    assert!(matches!(result, Err(LedgerError::Write(_))));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_load_rejects_malformed_documents() {
    let dir = tempfile::tempdir().unwrap();

    let truncated = dir.path().join("truncated.xml");
    let doc = planned_ledger("slide").export("slide");
    fs::write(&truncated, &doc[..doc.len() / 2]).unwrap();
    assert!(matches!(
        CoverageLedger::load("slide", &truncated),
        Err(LedgerError::Schema(_))
    ));

    let missing = dir.path().join("missing.xml");
    assert!(matches!(
        CoverageLedger::load("slide", &missing),
        Err(LedgerError::Read { .. })
    ));
}

#[test]
fn test_parse_rejects_skewed_rectangle() {
    let doc = r#"<?xml version='1.0' encoding='utf-8'?>
<ASAP_Annotations>
  <Annotations>
    <Annotation Name="Patch_0" Type="Rectangle" PartOfGroup="None" Color="255, 0, 0">
      <Coordinates>
        <Coordinate Order="0" X="0" Y="0" />
        <Coordinate Order="1" X="32" Y="0" />
        <Coordinate Order="2" X="32" Y="40" />
        <Coordinate Order="3" X="5" Y="32" />
      </Coordinates>
    </Annotation>
  </Annotations>
</ASAP_Annotations>"#;

    assert!(matches!(
        parse_document(doc),
        Err(SchemaError::InvalidValue { .. })
    ));
}
