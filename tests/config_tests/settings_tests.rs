//! Tests for Settings
//!
//! These tests verify:
//! - Defaults and builder overrides
//! - Validation of geometry and Bloom parameters
//! - settings.json persistence

use std::fs;

use hashdb::config::{validate_bloom, Settings, SETTINGS_FILENAME, SETTINGS_VERSION};
use hashdb::HashdbError;
use tempfile::TempDir;

// =============================================================================
// Defaults & Builder
// =============================================================================

#[test]
fn test_settings_defaults() {
    let settings = Settings::default();

    assert_eq!(settings.settings_version, SETTINGS_VERSION);
    assert_eq!(settings.byte_alignment, 512);
    assert_eq!(settings.block_size, 512);
    assert_eq!(settings.max_duplicates, 0);
    assert_eq!(settings.max_id_offset_pairs, 100_000);
    assert_eq!(settings.hash_truncation, 0);
    assert!(settings.bloom_used);
    assert_eq!(settings.bloom_m_hash_size, 28);
    assert_eq!(settings.bloom_k_hash_functions, 3);
    settings.validate().unwrap();
}

#[test]
fn test_settings_builder_overrides() {
    let settings = Settings::builder()
        .byte_alignment(2)
        .block_size(4096)
        .max_duplicates(20)
        .max_id_offset_pairs(5)
        .hash_truncation(8)
        .bloom(16, 2)
        .build()
        .unwrap();

    assert_eq!(settings.byte_alignment, 2);
    assert_eq!(settings.block_size, 4096);
    assert_eq!(settings.max_duplicates, 20);
    assert_eq!(settings.max_id_offset_pairs, 5);
    assert_eq!(settings.hash_truncation, 8);
    assert_eq!(settings.bloom_m_hash_size, 16);
    assert_eq!(settings.bloom_k_hash_functions, 2);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_settings_zero_alignment_rejected() {
    let result = Settings::builder().byte_alignment(0).build();
    assert!(matches!(result, Err(HashdbError::Settings(_))));
}

#[test]
fn test_settings_zero_block_size_rejected() {
    let result = Settings::builder().block_size(0).build();
    assert!(matches!(result, Err(HashdbError::Settings(_))));
}

#[test]
fn test_validate_bloom_bounds() {
    assert!(validate_bloom(3, 1).is_ok());
    assert!(validate_bloom(32, 5).is_ok());
    assert!(validate_bloom(2, 3).is_err());
    assert!(validate_bloom(33, 3).is_err());
    assert!(validate_bloom(16, 0).is_err());
    assert!(validate_bloom(16, 6).is_err());
}

#[test]
fn test_settings_wrong_version_rejected() {
    let settings = Settings {
        settings_version: SETTINGS_VERSION + 1,
        ..Settings::default()
    };
    assert!(settings.validate().is_err());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_settings_save_load_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::builder()
        .byte_alignment(4)
        .max_duplicates(7)
        .bloom_used(false)
        .build()
        .unwrap();

    settings.save(temp_dir.path()).unwrap();
    let loaded = Settings::load(temp_dir.path()).unwrap();

    assert_eq!(loaded, settings);
    assert!(!temp_dir.path().join("settings.json.tmp").exists());
}

#[test]
fn test_settings_file_is_readable_json() {
    let temp_dir = TempDir::new().unwrap();
    Settings::default().save(temp_dir.path()).unwrap();

    let text = fs::read_to_string(temp_dir.path().join(SETTINGS_FILENAME)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["byte_alignment"], 512);
    assert_eq!(value["bloom_used"], true);
}

#[test]
fn test_settings_load_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = Settings::load(temp_dir.path());
    assert!(matches!(result, Err(HashdbError::Settings(_))));
}

#[test]
fn test_settings_load_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(SETTINGS_FILENAME), "{ not json").unwrap();

    let result = Settings::load(temp_dir.path());
    assert!(matches!(result, Err(HashdbError::Settings(_))));
}
