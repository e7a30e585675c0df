//! Tests for WAL Writer
//!
//! These tests verify:
//! - Writing entries to WAL
//! - LSN generation and sequencing
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Truncation
//! - Reopening continues the LSN sequence

use shardkv::config::WalSyncStrategy;
use shardkv::wal::{WalReader, WalWriter};

use super::{delete, put, setup_temp_wal};

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let lsn = writer.append(put("key1", "value1", 1)).unwrap();

    assert_eq!(lsn, 1);
    assert_eq!(writer.current_lsn(), 2);
}

#[test]
fn test_write_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let lsn1 = writer.append(put("a", "1", 1)).unwrap();
    let lsn2 = writer.append(put("b", "2", 2)).unwrap();
    let lsn3 = writer.append(delete("a", 3)).unwrap();

    assert_eq!((lsn1, lsn2, lsn3), (1, 2, 3));
    assert_eq!(writer.current_lsn(), 4);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_every_write_leaves_nothing_pending() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1", 1)).unwrap();
    assert_eq!(writer.pending_sync(), 0);
}

#[test]
fn test_every_n_entries_batches_syncs() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();
    writer.append(put("a", "1", 1)).unwrap();
    writer.append(put("b", "2", 2)).unwrap();
    assert_eq!(writer.pending_sync(), 2);

    writer.append(put("c", "3", 3)).unwrap();
    assert_eq!(writer.pending_sync(), 0);

    writer.append(put("d", "4", 4)).unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.pending_sync(), 0);
}

// =============================================================================
// Truncation and Reopen Tests
// =============================================================================

#[test]
fn test_truncate_resets_log() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1", 1)).unwrap();
    writer.append(put("b", "2", 2)).unwrap();
    writer.truncate().unwrap();

    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);

    let lsn = writer.append(put("c", "3", 3)).unwrap();
    assert_eq!(lsn, 1);

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation.key(), b"c");
}

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a", "1", 1)).unwrap();
        writer.append(put("b", "2", 2)).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.append(put("c", "3", 3)).unwrap(), 3);
}

#[test]
fn test_reopen_cuts_partial_tail() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a", "1", 1)).unwrap();
    }
    let valid_len = std::fs::metadata(&wal_path).unwrap().len();

    // Half-written frame from a crash
    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes.extend_from_slice(&[0xAB; 10]);
    std::fs::write(&wal_path, &bytes).unwrap();

    let writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 2);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), valid_len);
}
