//! Tests for tab-delimited import
//!
//! These tests verify:
//! - Block index to byte offset conversion
//! - Naming of new sources
//! - Skipping of sources that predate the import
//! - Whitelist labelling and invalid line counting

use std::fs;
use std::io::Cursor;

use hashdb::codec::parse_digest;
use hashdb::codec::tab::{import_tab, import_tab_lines, WHITELIST_LABEL};
use hashdb::hash::HashMeta;
use hashdb::{Changes, HashDb, OpenMode, Settings};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db(temp_dir: &TempDir, name: &str) -> HashDb {
    let dir = temp_dir.path().join(name);
    let settings = Settings::builder()
        .block_size(4096)
        .byte_alignment(512)
        .bloom(16, 3)
        .build()
        .unwrap();
    HashDb::create(&dir, &settings).unwrap();
    HashDb::open(&dir, OpenMode::ReadWrite).unwrap()
}

fn d(s: &str) -> Vec<u8> {
    parse_digest(s).unwrap()
}

const TAB: &str = "# file_hash\tblock_hash\tindex\n\
                   aa\t0101\t0\n\
                   aa\t0202\t1\n\
                   bb\t0101\t3\n";

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_tab_offsets_use_block_size() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_temp_db(&temp_dir, "tab.hdb");
    let mut changes = Changes::default();

    import_tab_lines(&db, Cursor::new(TAB), "repo", "list.tab", None, &mut changes).unwrap();

    assert_eq!(changes.hashes_inserted, 3);
    let entry = db.find_hash(&d("0101")).unwrap();
    assert_eq!(entry.count, 2);
    assert_eq!(entry.source(&d("aa")).unwrap().offsets, vec![0]);
    assert_eq!(entry.source(&d("bb")).unwrap().offsets, vec![3 * 4096]);
    assert_eq!(db.find_hash(&d("0202")).unwrap().sources[0].offsets, vec![4096]);
}

#[test]
fn test_tab_names_new_sources() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_temp_db(&temp_dir, "tab.hdb");
    let tab_path = temp_dir.path().join("hashes.tab");
    fs::write(&tab_path, TAB).unwrap();
    let mut changes = Changes::default();

    import_tab(&db, &tab_path, None, None, &mut changes).unwrap();

    let source = db.find_source(&d("aa")).unwrap();
    assert_eq!(
        source.names,
        vec![("hashes.tab".to_string(), "hashes.tab".to_string())]
    );
}

#[test]
fn test_tab_reimport_adds_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_temp_db(&temp_dir, "tab.hdb");
    let mut changes = Changes::default();
    import_tab_lines(&db, Cursor::new(TAB), "repo", "list.tab", None, &mut changes).unwrap();

    let mut again = Changes::default();
    import_tab_lines(&db, Cursor::new(TAB), "repo", "other.tab", None, &mut again).unwrap();

    assert_eq!(again.hashes_inserted, 0);
    assert_eq!(again.source_names_inserted, 0);
    assert_eq!(db.find_source(&d("aa")).unwrap().names.len(), 1);
}

#[test]
fn test_tab_whitelist_label() {
    let temp_dir = TempDir::new().unwrap();
    let whitelist = setup_temp_db(&temp_dir, "whitelist.hdb");
    let mut changes = Changes::default();
    whitelist
        .insert_hash(&d("0202"), &d("cc"), 0, &HashMeta::default(), &mut changes)
        .unwrap();

    let db = setup_temp_db(&temp_dir, "tab.hdb");
    import_tab_lines(
        &db,
        Cursor::new(TAB),
        "repo",
        "list.tab",
        Some(&whitelist),
        &mut changes,
    )
    .unwrap();

    assert_eq!(db.find_hash(&d("0202")).unwrap().block_label, WHITELIST_LABEL);
    assert_eq!(db.find_hash(&d("0101")).unwrap().block_label, "");
}

#[test]
fn test_tab_invalid_lines_counted() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_temp_db(&temp_dir, "tab.hdb");
    let mut changes = Changes::default();
    let text = "aa\t0101\n\
                zz\t0101\t0\n\
                aa\t0101\tx\n\
                aa\t0303\t2\n";

    import_tab_lines(&db, Cursor::new(text), "repo", "t", None, &mut changes).unwrap();

    assert_eq!(changes.invalid_records, 3);
    assert_eq!(changes.hashes_inserted, 1);
}
