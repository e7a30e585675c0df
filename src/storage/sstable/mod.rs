//! Segment files
//!
//! Immutable, key-sorted files holding one versioned record per key. Built
//! by flushes and compactions, never modified afterwards.
//!
//! ```text
//! header   "SHKV" | format u16 | entry count u64                  14 bytes
//! data     per record:
//!            key_len u32 | val_len u32 | timestamp u64 | origin_len u16
//!            origin | key | value          (val_len = u32::MAX: tombstone)
//! index    per record: key_len u32 | offset u64 | key
//! footer   index offset u64 | CRC32 of data u32 | padding u32    16 bytes
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;
pub(crate) use reader::parse_segment_id;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a shardkv segment file
pub(crate) const MAGIC: &[u8; 4] = b"SHKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Fixed part of an entry: KeyLen (4) + ValLen (4) + Timestamp (8) + OriginLen (2)
pub(crate) const ENTRY_HEADER_SIZE: usize = 18;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Summary of a finished SSTable, returned by the builder
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// Number of tombstones written
    pub tombstone_count: u64,
    /// File size in bytes
    pub file_size: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false if key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}
