//! Tests for the scan manager
//!
//! These tests verify:
//! - The four scan modes over the same database
//! - Elision of repeated hashes and source lists in optimized mode
//! - Not-found results distinct from a zero count
//! - List scanning with inline errors

use std::io::Cursor;
use std::sync::Arc;

use hashdb::codec::{import_json, parse_digest};
use hashdb::scan::{scan_list, ScanResult};
use hashdb::{Changes, HashDb, OpenMode, ScanManager, ScanMode, Settings};
use serde_json::Value;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const RECORDS: &str = r#"{"block_hash":"2222","k_entropy":1,"block_label":"bl","source_offsets":["11",2,[0,512]]}
{"block_hash":"3333","k_entropy":0,"block_label":"","source_offsets":["11",1,[1024]]}
{"block_hash":"4444","k_entropy":0,"block_label":"","source_offsets":["11",1,[1536],"22",1,[0]]}
{"file_hash":"11","filesize":1536,"file_type":"ft","zero_count":0,"nonprobative_count":0,"name_pairs":["repo","file1"]}
{"file_hash":"22","filesize":512,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo","file2"]}
"#;

fn setup_manager() -> (TempDir, ScanManager) {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("scan.hdb");
    let settings = Settings::builder().bloom(16, 3).build().unwrap();
    HashDb::create(&dir, &settings).unwrap();
    let db = HashDb::open(&dir, OpenMode::ReadWrite).unwrap();
    let mut changes = Changes::default();
    import_json(&db, Cursor::new(RECORDS), &mut changes).unwrap();
    (temp_dir, ScanManager::new(Arc::new(db)))
}

fn d(s: &str) -> Vec<u8> {
    parse_digest(s).unwrap()
}

fn json(result: &ScanResult) -> Value {
    serde_json::from_str(&result.to_json().unwrap().unwrap()).unwrap()
}

// =============================================================================
// Modes
// =============================================================================

#[test]
fn test_scan_expanded() {
    let (_temp, manager) = setup_manager();

    let result = manager.scan(&d("2222"), ScanMode::Expanded);
    let value = json(&result);

    assert_eq!(value["block_hash"], "2222");
    assert_eq!(value["k_entropy"], 1);
    assert_eq!(value["block_label"], "bl");
    assert_eq!(value["count"], 2);
    assert_eq!(value["source_list_id"], 3_098_726_271u64);
    assert_eq!(value["sources"][0]["file_hash"], "11");
    assert_eq!(value["sources"][0]["name_pairs"][1], "file1");
    assert_eq!(value["source_offsets"], serde_json::json!(["11", 2, [0, 512]]));
}

#[test]
fn test_scan_expanded_repeats_in_full() {
    let (_temp, manager) = setup_manager();

    let first = manager.scan(&d("2222"), ScanMode::Expanded);
    let second = manager.scan(&d("2222"), ScanMode::Expanded);

    assert_eq!(first, second);
}

#[test]
fn test_scan_count() {
    let (_temp, manager) = setup_manager();

    let result = manager.scan(&d("4444"), ScanMode::Count);
    assert_eq!(
        result,
        ScanResult::Count {
            block_hash: "4444".into(),
            count: 2
        }
    );
    assert_eq!(result.to_json().unwrap().unwrap(), r#"{"block_hash":"4444","count":2}"#);
}

#[test]
fn test_scan_approximate_count() {
    let (_temp, manager) = setup_manager();

    match manager.scan(&d("2222"), ScanMode::ApproximateCount) {
        ScanResult::ApproximateCount {
            approximate_count, ..
        } => assert!(approximate_count >= 2),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_scan_not_found_in_every_mode() {
    let (_temp, manager) = setup_manager();

    for mode in [
        ScanMode::Expanded,
        ScanMode::ExpandedOptimized,
        ScanMode::Count,
        ScanMode::ApproximateCount,
    ] {
        let result = manager.scan(&d("9999"), mode);
        assert_eq!(result, ScanResult::NotFound, "{}", mode);
        assert!(!result.is_found());
        assert_eq!(result.to_json().unwrap(), None);
    }
}

// =============================================================================
// Optimized Mode
// =============================================================================

#[test]
fn test_scan_optimized_elides_repeated_hash() {
    let (_temp, manager) = setup_manager();

    let first = manager.scan(&d("2222"), ScanMode::ExpandedOptimized);
    let second = manager.scan(&d("2222"), ScanMode::ExpandedOptimized);

    assert!(matches!(first, ScanResult::Expanded(_)));
    assert_eq!(second.to_json().unwrap().unwrap(), r#"{"block_hash":"2222"}"#);
}

#[test]
fn test_scan_optimized_elides_seen_source_list() {
    let (_temp, manager) = setup_manager();

    // 2222 and 3333 share the source list {11}
    let first = json(&manager.scan(&d("2222"), ScanMode::ExpandedOptimized));
    let second = json(&manager.scan(&d("3333"), ScanMode::ExpandedOptimized));

    assert_eq!(first["sources"].as_array().unwrap().len(), 1);
    assert_eq!(second["sources"].as_array().unwrap().len(), 0);
    assert_eq!(first["source_list_id"], second["source_list_id"]);
    // offsets are still reported in full
    assert_eq!(second["source_offsets"], serde_json::json!(["11", 1, [1024]]));
}

#[test]
fn test_scan_optimized_sends_each_source_once() {
    let (_temp, manager) = setup_manager();

    manager.scan(&d("2222"), ScanMode::ExpandedOptimized);
    let value = json(&manager.scan(&d("4444"), ScanMode::ExpandedOptimized));

    // new source list {11, 22}, but 11 was already sent
    let sources = value["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["file_hash"], "22");
}

#[test]
fn test_scan_clear_resets_session() {
    let (_temp, manager) = setup_manager();

    manager.scan(&d("2222"), ScanMode::ExpandedOptimized);
    manager.clear();

    assert!(matches!(
        manager.scan(&d("2222"), ScanMode::ExpandedOptimized),
        ScanResult::Expanded(_)
    ));
}

// =============================================================================
// Hex & Lists
// =============================================================================

#[test]
fn test_scan_hex_invalid() {
    let (_temp, manager) = setup_manager();

    assert!(manager.scan_hex("xyz", ScanMode::Count).is_err());
    assert!(manager.scan_hex("2222", ScanMode::Count).unwrap().is_found());
}

#[test]
fn test_scan_list() {
    let (_temp, manager) = setup_manager();
    let input = "# header\n\
                 a\t2222\n\
                 b\t9999\n\
                 c\tzz\n\
                 no tab\n\
                 d\t4444\n";
    let mut out = Vec::new();

    let summary = scan_list(&manager, Cursor::new(input), &mut out, ScanMode::Count).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(summary.queries, 5);
    assert_eq!(summary.matches, 2);
    assert_eq!(summary.errors, 2);
    assert_eq!(lines[0], "# header");
    assert_eq!(lines[1], r#"a	2222	{"block_hash":"2222","count":2}"#);
    assert_eq!(lines[2], "# error: unexpected hex character in 'zz'");
    assert!(lines[3].starts_with("# error: expected label and block hash"));
    assert_eq!(lines[4], r#"d	4444	{"block_hash":"4444","count":2}"#);
}

#[test]
fn test_scan_mode_parse() {
    assert_eq!("e".parse::<ScanMode>().unwrap(), ScanMode::Expanded);
    assert_eq!("o".parse::<ScanMode>().unwrap(), ScanMode::ExpandedOptimized);
    assert_eq!("count".parse::<ScanMode>().unwrap(), ScanMode::Count);
    assert_eq!("a".parse::<ScanMode>().unwrap(), ScanMode::ApproximateCount);
    assert!("q".parse::<ScanMode>().is_err());
}
