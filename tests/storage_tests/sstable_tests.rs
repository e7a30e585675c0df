//! Tests for SSTable
//!
//! These tests verify:
//! - Building and reading back records with their versions
//! - Tombstones survive the round trip
//! - Key ordering is enforced by the builder
//! - Corrupted files are rejected on open
//! - Range iteration

use std::sync::Arc;

use shardkv::storage::{KeyRange, SSTableBuilder, SSTableReader};
use shardkv::{Record, Value, Version};
use tempfile::TempDir;

use super::v;

fn build(dir: &TempDir, name: &str, records: &[Record]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut builder = SSTableBuilder::new(&path).unwrap();
    for record in records {
        builder.add(record).unwrap();
    }
    builder.finish().unwrap();
    path
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_build_and_get() {
    let temp = TempDir::new().unwrap();
    let records = vec![
        Record::put("apple", "red", Version::new(10, "node-a")),
        Record::put("banana", "yellow", Version::new(11, "node-b")),
        Record::tombstone("cherry", Version::new(12, "node-a")),
    ];
    let path = build(&temp, "segment_000001.sst", &records);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 3);
    assert_eq!(reader.id(), 1);

    for record in &records {
        assert_eq!(reader.get(&record.key).unwrap().as_ref(), Some(record));
    }
    assert!(reader.get(b"durian").unwrap().is_none());
}

#[test]
fn test_tombstone_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = build(&temp, "segment_000002.sst", &[Record::tombstone("gone", v(5))]);

    let reader = SSTableReader::open(&path).unwrap();
    let record = reader.get(b"gone").unwrap().unwrap();
    assert_eq!(record.value, Value::Tombstone);
    assert_eq!(record.version, v(5));
}

#[test]
fn test_metadata_from_builder() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("segment_000003.sst");
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(&Record::put("b", "1", v(1))).unwrap();
    builder.add(&Record::tombstone("c", v(2))).unwrap();
    builder.add(&Record::put("d", "3", v(3))).unwrap();
    assert_eq!(builder.entry_count(), 3);

    let table = builder.finish().unwrap();
    assert_eq!(table.entry_count(), 3);
    assert_eq!(table.tombstone_count, 1);
    assert_eq!(table.min_key, b"b".to_vec());
    assert_eq!(table.max_key, b"d".to_vec());
    assert!(table.might_contain(b"c"));
    assert!(!table.might_contain(b"a"));
    assert!(!table.might_contain(b"e"));
    assert_eq!(table.file_size, std::fs::metadata(&path).unwrap().len());
}

#[test]
fn test_keys_must_ascend() {
    let temp = TempDir::new().unwrap();
    let mut builder = SSTableBuilder::new(&temp.path().join("segment_000004.sst")).unwrap();
    builder.add(&Record::put("b", "1", v(1))).unwrap();

    assert!(builder.add(&Record::put("a", "2", v(2))).is_err());
    assert!(builder.add(&Record::put("b", "3", v(3))).is_err());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupted_data_rejected() {
    let temp = TempDir::new().unwrap();
    let path = build(
        &temp,
        "segment_000005.sst",
        &[Record::put("k1", "v1", v(1)), Record::put("k2", "v2", v(2))],
    );

    let mut bytes = std::fs::read(&path).unwrap();
    // First byte of the data block
    bytes[14] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = SSTableReader::open(&path).unwrap_err();
    assert!(err.to_string().contains("checksum"), "unexpected error: {}", err);
}

#[test]
fn test_bad_magic_rejected() {
    let temp = TempDir::new().unwrap();
    let path = build(&temp, "segment_000006.sst", &[Record::put("k", "v", v(1))]);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = b'X';
    std::fs::write(&path, &bytes).unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

#[test]
fn test_truncated_file_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("segment_000007.sst");
    std::fs::write(&path, b"SHKV").unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_range_iteration() {
    let temp = TempDir::new().unwrap();
    let records: Vec<Record> = ["a", "b", "c", "d", "e"]
        .iter()
        .enumerate()
        .map(|(i, k)| Record::put(*k, "x", v(i as u64 + 1)))
        .collect();
    let path = build(&temp, "segment_000008.sst", &records);
    let reader = Arc::new(SSTableReader::open(&path).unwrap());

    let keys: Vec<Vec<u8>> = reader
        .range(&KeyRange::between("b", "e"))
        .map(|r| r.unwrap().key)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

    let mut all = reader.iter();
    assert_eq!(all.remaining(), 5);
    all.next();
    assert_eq!(all.remaining(), 4);

    assert_eq!(reader.min_key(), Some(&b"a"[..]));
    assert_eq!(reader.max_key(), Some(&b"e"[..]));
    assert_eq!(reader.range(&KeyRange::between("x", "a")).count(), 0);
}
