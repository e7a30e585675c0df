//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::record::{Record, Value, Version};
use crate::storage::KeyRange;
use super::MemTableEntry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,
    /// Approximate size in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Get the entry for a key as a full record
    pub fn get_record(&self, key: &[u8]) -> Option<Record> {
        self.get(key).map(|entry| entry.into_record(key.to_vec()))
    }

    /// Install a record unless the table already holds a newer or equal version
    ///
    /// Returns true if the record was installed.
    pub fn apply(&self, record: Record) -> bool {
        let Record {
            key,
            value,
            version,
        } = record;
        let entry = MemTableEntry { value, version };
        let added = entry.footprint(&key);

        let mut data = self.data.write();
        if let Some(existing) = data.get(&key) {
            if existing.version >= entry.version {
                return false;
            }
            let removed = existing.footprint(&key);
            self.size.fetch_sub(removed, Ordering::Relaxed);
        }
        data.insert(key, entry);
        self.size.fetch_add(added, Ordering::Relaxed);
        true
    }

    /// Put a key-value pair at `version`
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, version: Version) -> bool {
        self.apply(Record::put(key, value, version))
    }

    /// Delete a key at `version` (inserts tombstone)
    pub fn delete(&self, key: Vec<u8>, version: Version) -> bool {
        self.apply(Record::tombstone(key, version))
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        let entries: Vec<Record> = self
            .data
            .read()
            .iter()
            .map(|(k, e)| e.clone().into_record(k.clone()))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }

    /// Snapshot of the entries inside `range`, tombstones included
    pub fn range(&self, range: &KeyRange) -> Vec<Record> {
        if range.is_empty() {
            return Vec::new();
        }
        self.data
            .read()
            .range::<Vec<u8>, _>(range.bounds())
            .map(|(k, e)| e.clone().into_record(k.clone()))
            .collect()
    }

    /// Number of live (non-tombstone) entries
    pub fn live_count(&self) -> usize {
        self.data
            .read()
            .values()
            .filter(|e| !matches!(e.value, Value::Tombstone))
            .count()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a MemTable snapshot
pub struct MemTableIterator {
    inner: std::vec::IntoIter<Record>,
}

impl Iterator for MemTableIterator {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
