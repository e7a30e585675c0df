//! SSTable Iterator
//!
//! Ordered iteration over the records of one SSTable. Offsets come from the
//! in-memory index; each record is read from disk only when requested.

use std::sync::Arc;

use crate::error::Result;
use crate::record::Record;

use super::SSTableReader;

/// Iterator over SSTable records in sorted key order
///
/// Holds its own reference to the reader, so the segment stays readable
/// (and on disk) for as long as the iterator lives.
pub struct SSTableIterator {
    reader: Arc<SSTableReader>,
    offsets: std::vec::IntoIter<u64>,
}

impl SSTableIterator {
    pub(super) fn new(reader: Arc<SSTableReader>, offsets: Vec<u64>) -> Self {
        Self {
            reader,
            offsets: offsets.into_iter(),
        }
    }

    /// Records left to yield
    pub fn remaining(&self) -> usize {
        self.offsets.len()
    }
}

impl Iterator for SSTableIterator {
    /// Tombstones are yielded too
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offsets.next()?;
        Some(self.reader.read_at(offset))
    }
}
