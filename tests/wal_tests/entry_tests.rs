//! Tests for WAL entries
//!
//! These tests verify:
//! - Frame serialization and deserialization
//! - CRC detection of flipped bits
//! - Header/entry LSN agreement
//! - Operation <-> Record conversion

use shardkv::wal::{Operation, WalEntry, HEADER_SIZE};
use shardkv::{Record, Value, Version};

use super::{delete, put};

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_serialize_deserialize_put() {
    let entry = WalEntry::new(7, put("user:1", "alice", 100));
    let bytes = entry.serialize().unwrap();

    assert!(bytes.len() > HEADER_SIZE);
    assert_eq!(&bytes[0..8], &7u64.to_le_bytes());

    let decoded = WalEntry::deserialize(&bytes).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_serialize_deserialize_delete() {
    let entry = WalEntry::new(1, delete("user:1", 200));
    let decoded = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();

    assert_eq!(decoded.operation.key(), b"user:1");
    assert_eq!(decoded.operation.version(), &Version::new(200, "n1"));
}

#[test]
fn test_crc_mismatch_detected() {
    let entry = WalEntry::new(1, put("k", "v", 1));
    let mut bytes = entry.serialize().unwrap();

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let err = WalEntry::deserialize(&bytes).unwrap_err();
    assert!(err.to_string().contains("CRC"), "unexpected error: {}", err);
}

#[test]
fn test_header_lsn_must_match_entry() {
    let entry = WalEntry::new(5, put("k", "v", 1));
    let mut bytes = entry.serialize().unwrap();
    bytes[0..8].copy_from_slice(&6u64.to_le_bytes());

    assert!(WalEntry::deserialize(&bytes).is_err());
}

#[test]
fn test_truncated_frame_rejected() {
    let entry = WalEntry::new(1, put("k", "value", 1));
    let bytes = entry.serialize().unwrap();

    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE - 1]).is_err());
    assert!(WalEntry::deserialize(&bytes[..bytes.len() - 1]).is_err());
}

// =============================================================================
// Operation Conversion Tests
// =============================================================================

#[test]
fn test_operation_from_record() {
    let record = Record::put("a", "1", Version::new(3, "n2"));
    let op = Operation::from(&record);
    assert!(matches!(op, Operation::Put { .. }));
    assert_eq!(op.into_record(), record);

    let tombstone = Record::tombstone("a", Version::new(4, "n2"));
    let op = Operation::from(&tombstone);
    assert!(matches!(op, Operation::Delete { .. }));

    let back = op.into_record();
    assert_eq!(back.value, Value::Tombstone);
    assert_eq!(back.version.timestamp, 4);
}
