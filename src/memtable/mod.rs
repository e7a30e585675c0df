//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Last-write-wins per key: an older version never replaces a newer one
//! - Track size for flush triggers
//! - Ordered iteration for segment creation and range scans
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for segment generation and scans)
//! - Many concurrent readers, writes serialized by the engine's write lock

mod table;

pub use table::{MemTable, MemTableIterator};

use crate::record::{Record, Value, Version};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemTableEntry {
    pub value: Value,
    pub version: Version,
}

impl MemTableEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_tombstone()
    }

    pub fn into_record(self, key: Vec<u8>) -> Record {
        Record {
            key,
            value: self.value,
            version: self.version,
        }
    }

    /// Approximate memory footprint of this entry under `key`
    pub(crate) fn footprint(&self, key: &[u8]) -> usize {
        // Fixed part: timestamp + discriminant + lengths
        key.len() + self.value.len() + self.version.origin.as_str().len() + 16
    }
}
