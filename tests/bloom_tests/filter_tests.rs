//! Tests for the Bloom accelerator
//!
//! These tests verify:
//! - No false negatives
//! - Parameter validation
//! - Persistence of bits and parameters

use hashdb::bloom::BloomFilter;
use proptest::prelude::*;
use tempfile::TempDir;

fn digest(i: u32) -> Vec<u8> {
    let mut d = vec![0u8; 16];
    d[..4].copy_from_slice(&i.to_le_bytes());
    d[12..].copy_from_slice(&i.wrapping_mul(2_654_435_761).to_le_bytes());
    d
}

#[test]
fn test_bloom_empty_filter() {
    let filter = BloomFilter::new(16, 3).unwrap();
    assert!(!filter.maybe_present(&digest(1)));
    assert_eq!(filter.bits_set(), 0);
}

#[test]
fn test_bloom_added_digests_present() {
    let mut filter = BloomFilter::new(16, 3).unwrap();
    for i in 0..500 {
        filter.add(&digest(i));
    }
    for i in 0..500 {
        assert!(filter.maybe_present(&digest(i)));
    }
    assert!(filter.bits_set() > 0);
}

#[test]
fn test_bloom_short_digest() {
    let mut filter = BloomFilter::new(8, 2).unwrap();
    filter.add(&[0x12, 0x34]);
    assert!(filter.maybe_present(&[0x12, 0x34]));
}

#[test]
fn test_bloom_invalid_parameters() {
    assert!(BloomFilter::new(2, 3).is_err());
    assert!(BloomFilter::new(16, 0).is_err());
    assert!(BloomFilter::new(16, 6).is_err());
}

#[test]
fn test_bloom_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bloom_filter");
    let mut filter = BloomFilter::new(20, 4).unwrap();
    for i in 0..100 {
        filter.add(&digest(i));
    }
    filter.save(&path).unwrap();

    let loaded = BloomFilter::load(&path).unwrap();
    assert_eq!(loaded, filter);
    assert_eq!(loaded.m_hash_size(), 20);
    assert_eq!(loaded.k_hash_functions(), 4);
}

proptest! {
    #[test]
    fn prop_bloom_no_false_negatives(
        digests in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 1..100),
        m in 3u32..18,
        k in 1u32..6,
    ) {
        let mut filter = BloomFilter::new(m, k).unwrap();
        for d in &digests {
            filter.add(d);
        }
        for d in &digests {
            prop_assert!(filter.maybe_present(d));
        }
    }
}
