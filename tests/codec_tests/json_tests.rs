//! Tests for the JSON codec
//!
//! These tests verify:
//! - Import of hash and source records
//! - Invalid and non-JSON lines counted and skipped
//! - Export reproducing imported records exactly
//! - Range-limited export

use std::io::Cursor;

use hashdb::codec::{export_json, import_json, parse_digest, HashRange};
use hashdb::{Changes, HashDb, OpenMode, Settings};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const RECORDS: &str = r#"{"block_hash":"2222","k_entropy":1,"block_label":"bl","source_offsets":["11",2,[0,512]]}
{"block_hash":"8899","k_entropy":0,"block_label":"","source_offsets":["11",1,[1024],"22",1,[0]]}
{"file_hash":"11","filesize":1536,"file_type":"ft","zero_count":2,"nonprobative_count":3,"name_pairs":["repo","file1","repo2","file1"]}
{"file_hash":"22","filesize":512,"file_type":"","zero_count":0,"nonprobative_count":0,"name_pairs":["repo","file2"]}
"#;

fn setup_temp_db() -> (TempDir, HashDb) {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("json.hdb");
    let settings = Settings::builder().bloom(16, 3).build().unwrap();
    HashDb::create(&dir, &settings).unwrap();
    let db = HashDb::open(&dir, OpenMode::ReadWrite).unwrap();
    (temp_dir, db)
}

fn import(db: &HashDb, text: &str) -> Changes {
    let mut changes = Changes::default();
    import_json(db, Cursor::new(text), &mut changes).unwrap();
    changes
}

fn export(db: &HashDb, range: Option<&HashRange>) -> String {
    let mut out = Vec::new();
    export_json(db, &mut out, range, "export test").unwrap();
    String::from_utf8(out).unwrap()
}

fn body(export: &str) -> String {
    export
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| format!("{}\n", l))
        .collect()
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_hash_and_source_records() {
    let (_temp, db) = setup_temp_db();
    let changes = import(&db, RECORDS);

    assert_eq!(changes.hashes_inserted, 4);
    assert_eq!(changes.source_names_inserted, 3);
    assert_eq!(changes.invalid_records, 0);

    let entry = db.find_hash(&parse_digest("2222").unwrap()).unwrap();
    assert_eq!(entry.count, 2);
    assert_eq!(entry.block_label, "bl");
    assert_eq!(entry.sources[0].offsets, vec![0, 512]);

    let source = db.find_source(&parse_digest("11").unwrap()).unwrap();
    assert_eq!(source.metadata.unwrap().filesize, 1536);
    assert_eq!(source.names.len(), 2);
}

#[test]
fn test_import_twice_is_idempotent() {
    let (_temp, db) = setup_temp_db();
    import(&db, RECORDS);
    let changes = import(&db, RECORDS);

    assert_eq!(changes.hashes_inserted, 0);
    assert_eq!(changes.hashes_not_inserted_duplicate_occurrence, 4);
    assert_eq!(changes.source_data_same, 2);
    assert_eq!(db.size().occurrences, 4);
}

#[test]
fn test_import_invalid_records_are_counted() {
    let (_temp, db) = setup_temp_db();
    let text = "# comment\n\
                {\"block_hash\":\"zz\",\"source_offsets\":[\"11\",1,[0]]}\n\
                {\"file_hash\":\"123\"}\n\
                {\"something\":1}\n\
                {\"block_hash\":\"2222\",\"source_offsets\":[\"11\",1]}\n\
                {\"block_hash\":\"3333\",\"source_offsets\":[\"11\",1,[0]]}\n";
    let changes = import(&db, text);

    assert_eq!(changes.invalid_records, 4);
    assert_eq!(changes.hashes_inserted, 1);
}

#[test]
fn test_import_skips_non_json_line() {
    let (_temp, db) = setup_temp_db();
    let text = "{\"file_hash\":\"11\",\"filesize\":1,\"file_type\":\"\",\"zero_count\":0,\"nonprobative_count\":0,\"name_pairs\":[]}\n\
                {not json\n\
                {\"file_hash\":\"22\",\"filesize\":2,\"file_type\":\"\",\"zero_count\":0,\"nonprobative_count\":0,\"name_pairs\":[]}\n";
    let changes = import(&db, text);

    assert_eq!(changes.invalid_records, 1);
    assert!(db.find_source(&parse_digest("11").unwrap()).is_some());
    assert!(db.find_source(&parse_digest("22").unwrap()).is_some());
}

#[test]
fn test_import_skips_json_array_line() {
    let (_temp, db) = setup_temp_db();
    let text = "[1,2]\n{\"block_hash\":\"2222\",\"source_offsets\":[\"11\",1,[0]]}\n";
    let changes = import(&db, text);

    assert_eq!(changes.invalid_records, 1);
    assert_eq!(changes.hashes_inserted, 1);
    assert_eq!(db.find_hash_count(&parse_digest("2222").unwrap()), Some(1));
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_export_reproduces_import() {
    let (_temp, db) = setup_temp_db();
    import(&db, RECORDS);

    let exported = export(&db, None);

    assert!(exported.starts_with("# command: export test\n# hashdb-Version: "));
    assert_eq!(body(&exported), RECORDS);
}

#[test]
fn test_export_of_reimport_is_identical() {
    let (_temp, db) = setup_temp_db();
    import(&db, RECORDS);
    let first = export(&db, None);

    let (_temp2, other) = setup_temp_db();
    import(&other, &first);
    let second = export(&other, None);

    assert_eq!(body(&first), body(&second));
}

#[test]
fn test_export_range() {
    let (_temp, db) = setup_temp_db();
    import(&db, RECORDS);
    let range = HashRange::parse("80:").unwrap();

    let exported = body(&export(&db, Some(&range)));
    let lines: Vec<&str> = exported.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("{\"block_hash\":\"8899\""));
    assert!(lines[1].starts_with("{\"file_hash\":\"11\""));
    assert!(lines[2].starts_with("{\"file_hash\":\"22\""));
}

#[test]
fn test_export_empty_range() {
    let (_temp, db) = setup_temp_db();
    import(&db, RECORDS);
    let range = HashRange::parse("30:40").unwrap();

    assert_eq!(body(&export(&db, Some(&range))), "");
}

#[test]
fn test_parse_digest_errors() {
    assert_eq!(
        parse_digest("zz").unwrap_err().to_string(),
        "unexpected hex character in 'zz'"
    );
    assert_eq!(
        parse_digest("abc").unwrap_err().to_string(),
        "odd number of hex characters in 'abc'"
    );
    assert!(parse_digest("").is_err());
    assert_eq!(parse_digest("0aFF").unwrap(), vec![0x0a, 0xff]);
}
