//! Tests for database set algebra
//!
//! These tests verify:
//! - Union, intersection and difference by source and by hash
//! - Repository, ordinal and count selection
//! - Deduplication of provenance names
//! - Destinations built atomically, and idempotent reruns

use std::io::Cursor;
use std::path::{Path, PathBuf};

use hashdb::codec::{export_json, import_json, parse_digest};
use hashdb::ops::{self, CountRange, OrdinalRange};
use hashdb::{Changes, HashDb, HashdbError, OpenMode, Settings};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const DB_A: &str = r#"{"block_hash":"1111","source_offsets":["aa",2,[0,512]]}
{"block_hash":"2222","source_offsets":["aa",1,[1024],"bb",1,[0]]}
{"block_hash":"3333","source_offsets":["bb",1,[512]]}
{"file_hash":"aa","filesize":1536,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo1","a1","repo2","a2"]}
{"file_hash":"bb","filesize":1024,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo2","b"]}
"#;

const DB_B: &str = r#"{"block_hash":"2222","source_offsets":["bb",1,[0],"cc",1,[0]]}
{"block_hash":"3333","source_offsets":["cc",1,[4096]]}
{"block_hash":"4444","source_offsets":["cc",1,[512]]}
{"file_hash":"bb","filesize":1024,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo3","b3"]}
{"file_hash":"cc","filesize":8192,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo3","c"]}
"#;

fn settings() -> Settings {
    Settings::builder().bloom(16, 3).build().unwrap()
}

/// Create and commit a database at `temp/name` holding `records`
fn setup_temp_db(temp_dir: &TempDir, name: &str, records: &str) -> PathBuf {
    let dir = temp_dir.path().join(name);
    HashDb::create(&dir, &settings()).unwrap();
    let db = HashDb::open(&dir, OpenMode::ReadWrite).unwrap();
    let mut changes = Changes::default();
    import_json(&db, Cursor::new(records), &mut changes).unwrap();
    db.commit().unwrap();
    dir
}

fn open(dir: &Path) -> HashDb {
    HashDb::open(dir, OpenMode::ReadOnly).unwrap()
}

fn d(s: &str) -> Vec<u8> {
    parse_digest(s).unwrap()
}

fn hashes(dir: &Path) -> Vec<String> {
    open(dir)
        .hash_entries()
        .into_iter()
        .map(|e| hex::encode(e.block_hash))
        .collect()
}

fn sources(dir: &Path) -> Vec<String> {
    open(dir).source_hashes().into_iter().map(hex::encode).collect()
}

/// Export body without the header lines
fn dump(dir: &Path) -> String {
    let mut out = Vec::new();
    export_json(&open(dir), &mut out, None, "dump").unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| format!("{}\n", l))
        .collect()
}

// =============================================================================
// Union
// =============================================================================

#[test]
fn test_add_into_new_destination() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    let changes = ops::add(&a, &out).unwrap();

    assert_eq!(changes.hashes_inserted, 5);
    assert_eq!(dump(&out), dump(&a));
    assert!(out.join("log.txt").is_file());
    assert!(!temp_dir.path().join(".out.building").exists());
}

#[test]
fn test_add_into_existing_merges() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);

    ops::add(&a, &b).unwrap();

    let db = open(&b);
    assert_eq!(hashes(&b), vec!["1111", "2222", "3333", "4444"]);
    assert_eq!(db.find_hash_count(&d("2222")), Some(3));
    let bb = db.find_source(&d("bb")).unwrap();
    assert_eq!(bb.names.len(), 2);
}

#[test]
fn test_operation_logged_in_destination() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::unique(&a, &out).unwrap();

    let log = std::fs::read_to_string(out.join("log.txt")).unwrap();
    let first = log.lines().next().unwrap();
    assert!(first.starts_with("# command: unique "));
    assert!(log.contains("\"hashes_inserted\":1"));
}

#[test]
fn test_operation_log_carries_timestamps() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::unique(&a, &out).unwrap();

    let log = std::fs::read_to_string(out.join("log.txt")).unwrap();
    let events: Vec<serde_json::Value> = log
        .lines()
        .filter(|l| l.starts_with("{\"name\""))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["name"], "begin unique");
    assert_eq!(events[1]["name"], "end unique");
    let begin_total = events[0]["total"].as_f64().unwrap();
    let end_total = events[1]["total"].as_f64().unwrap();
    assert!(events[1]["delta"].as_f64().unwrap() >= 0.0);
    assert!(end_total >= begin_total);

    let changes_line = log.lines().position(|l| l.starts_with("{\"changes\"")).unwrap();
    let end_line = log.lines().position(|l| l.contains("end unique")).unwrap();
    assert!(end_line < changes_line);
}

#[test]
fn test_add_twice_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::add(&a, &out).unwrap();
    let before = dump(&out);
    let changes = ops::add(&a, &out).unwrap();

    assert_eq!(changes.hashes_inserted, 0);
    assert_eq!(dump(&out), before);
}

#[test]
fn test_add_multiple_is_order_independent() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let ab = temp_dir.path().join("ab");
    let ba = temp_dir.path().join("ba");

    ops::add_multiple(&[&a, &b], &ab).unwrap();
    ops::add_multiple(&[&b, &a], &ba).unwrap();

    assert_eq!(dump(&ab), dump(&ba));
    assert_eq!(sources(&ab), vec!["aa", "bb", "cc"]);
    let names = open(&ab).find_source(&d("bb")).unwrap().names;
    assert_eq!(
        names,
        vec![
            ("repo2".to_string(), "b".to_string()),
            ("repo3".to_string(), "b3".to_string()),
        ]
    );
}

#[test]
fn test_add_missing_input_leaves_no_destination() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("out");

    let result = ops::add(&temp_dir.path().join("missing"), &out);

    assert!(matches!(result, Err(HashdbError::NotFound(_))));
    assert!(!out.exists());
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_add_repository() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::add_repository(&a, &out, "repo1").unwrap();

    assert_eq!(sources(&out), vec!["aa"]);
    assert_eq!(hashes(&out), vec!["1111", "2222"]);
    let db = open(&out);
    assert_eq!(db.find_hash_count(&d("2222")), Some(1));
    assert_eq!(
        db.find_source(&d("aa")).unwrap().names,
        vec![("repo1".to_string(), "a1".to_string())]
    );
}

#[test]
fn test_subtract_repository() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::subtract_repository(&a, &out, "repo1").unwrap();

    assert_eq!(sources(&out), vec!["bb"]);
    assert_eq!(hashes(&out), vec!["2222", "3333"]);
}

#[test]
fn test_add_range_by_ordinal() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::add_range(&a, &out, OrdinalRange::parse("1:").unwrap()).unwrap();

    assert_eq!(sources(&out), vec!["bb"]);
    assert_eq!(hashes(&out), vec!["2222", "3333"]);
}

#[test]
fn test_add_count_range() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::add_count_range(&a, &out, CountRange::parse("2:0").unwrap()).unwrap();

    assert_eq!(hashes(&out), vec!["1111", "2222"]);
}

#[test]
fn test_unique() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::unique(&a, &out).unwrap();

    assert_eq!(hashes(&out), vec!["3333"]);
    assert_eq!(sources(&out), vec!["bb"]);
}

#[test]
fn test_deduplicate_keeps_one_name() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let out = temp_dir.path().join("out");

    ops::deduplicate(&a, &out).unwrap();

    let db = open(&out);
    assert_eq!(
        db.find_source(&d("aa")).unwrap().names,
        vec![("repo1".to_string(), "a1".to_string())]
    );
    assert_eq!(db.size().occurrences, 5);
}

#[test]
fn test_range_parsing() {
    let range = OrdinalRange::parse(":2").unwrap();
    assert!(range.contains(0) && range.contains(1) && !range.contains(2));
    assert!(OrdinalRange::parse("5:1").is_err());
    assert!(OrdinalRange::parse("nope").is_err());

    let counts = CountRange::parse("2:3").unwrap();
    assert!(!counts.contains(1) && counts.contains(3) && !counts.contains(4));
    assert!(CountRange::new(1, 0).contains(1_000_000));
}

// =============================================================================
// Intersection & Difference
// =============================================================================

#[test]
fn test_intersect_by_source() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let out = temp_dir.path().join("out");

    ops::intersect(&a, &b, &out).unwrap();

    // only (2222, bb, 0) occurs in both
    assert_eq!(hashes(&out), vec!["2222"]);
    assert_eq!(sources(&out), vec!["bb"]);
    let db = open(&out);
    assert_eq!(db.find_hash_count(&d("2222")), Some(1));
    assert_eq!(db.find_source(&d("bb")).unwrap().names.len(), 2);
}

#[test]
fn test_intersect_is_symmetric() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let ab = temp_dir.path().join("ab");
    let ba = temp_dir.path().join("ba");

    ops::intersect(&a, &b, &ab).unwrap();
    ops::intersect(&b, &a, &ba).unwrap();

    assert_eq!(hashes(&ab), hashes(&ba));
    assert_eq!(sources(&ab), sources(&ba));
    assert_eq!(open(&ab).size().occurrences, open(&ba).size().occurrences);
}

#[test]
fn test_intersect_hash() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let out = temp_dir.path().join("out");

    ops::intersect_hash(&a, &b, &out).unwrap();

    assert_eq!(hashes(&out), vec!["2222", "3333"]);
    let db = open(&out);
    assert_eq!(db.find_hash_count(&d("2222")), Some(3));
    assert_eq!(db.find_hash_count(&d("3333")), Some(2));
    assert_eq!(sources(&out), vec!["aa", "bb", "cc"]);
}

#[test]
fn test_subtract_by_source() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let out = temp_dir.path().join("out");

    ops::subtract(&a, &b, &out).unwrap();

    let db = open(&out);
    assert_eq!(hashes(&out), vec!["1111", "2222", "3333"]);
    let entry = db.find_hash(&d("2222")).unwrap();
    assert_eq!(entry.count, 1);
    assert!(entry.source(&d("bb")).is_none());
}

#[test]
fn test_subtract_hash() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(&temp_dir, "a", DB_A);
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let out = temp_dir.path().join("out");

    ops::subtract_hash(&a, &b, &out).unwrap();

    assert_eq!(hashes(&out), vec!["1111"]);
    assert_eq!(sources(&out), vec!["aa"]);
}

#[test]
fn test_add_then_subtract_restores() {
    let temp_dir = TempDir::new().unwrap();
    let a = setup_temp_db(
        &temp_dir,
        "a",
        r#"{"block_hash":"5555","source_offsets":["dd",1,[0]]}
{"file_hash":"dd","filesize":512,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo9","d"]}
"#,
    );
    let b = setup_temp_db(&temp_dir, "b", DB_B);
    let original = dump(&b);

    ops::add(&a, &b).unwrap();
    assert_ne!(dump(&b), original);

    let restored = temp_dir.path().join("restored");
    ops::subtract(&b, &a, &restored).unwrap();

    assert_eq!(dump(&restored), original);
}

#[test]
fn test_compacted_occurrences_intersect_by_count() {
    let temp_dir = TempDir::new().unwrap();
    let records_a = r#"{"block_hash":"7777","source_offsets":["aa",5,[0]]}
"#;
    let records_b = r#"{"block_hash":"7777","source_offsets":["aa",3,[0]]}
"#;
    let a = setup_temp_db(&temp_dir, "a", records_a);
    let b = setup_temp_db(&temp_dir, "b", records_b);
    let both = temp_dir.path().join("both");
    let only_a = temp_dir.path().join("only_a");

    ops::intersect(&a, &b, &both).unwrap();
    ops::subtract(&a, &b, &only_a).unwrap();

    assert_eq!(open(&both).find_hash_count(&d("7777")), Some(3));
    assert_eq!(open(&only_a).find_hash_count(&d("7777")), Some(2));
}
