//! Merge iterator over several sorted record sources.
//!
//! Produces records in ascending key order. When the same key appears in more
//! than one source, only the record with the highest version is emitted, so
//! physical order of the sources never decides a conflict.
//!
//! Used by range scans (MemTable + segments) and by compaction (segments only).

use crate::error::Result;
use crate::record::Record;

/// One sorted input: keys strictly ascending within the source
pub type RecordSource = Box<dyn Iterator<Item = Result<Record>> + Send>;

pub struct MergeIterator {
    sources: Vec<RecordSource>,
    /// Next unconsumed record of each source
    heads: Vec<Option<Record>>,
    exhausted: Vec<bool>,
    include_tombstones: bool,
    failed: bool,
}

impl MergeIterator {
    /// Merge `sources`; tombstones are yielded only if `include_tombstones`
    pub fn new(sources: Vec<RecordSource>, include_tombstones: bool) -> Self {
        let n = sources.len();
        Self {
            sources,
            heads: vec![None; n],
            exhausted: vec![false; n],
            include_tombstones,
            failed: false,
        }
    }

    /// Pull the next record of every source whose head was consumed
    fn fill(&mut self) -> Result<()> {
        for i in 0..self.sources.len() {
            if self.heads[i].is_some() || self.exhausted[i] {
                continue;
            }
            match self.sources[i].next() {
                Some(Ok(record)) => self.heads[i] = Some(record),
                Some(Err(e)) => return Err(e),
                None => self.exhausted[i] = true,
            }
        }
        Ok(())
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Err(e) = self.fill() {
                self.failed = true;
                return Some(Err(e));
            }

            let min_key = self.heads.iter().flatten().map(|r| &r.key).min()?.clone();

            // Consume the key from every source holding it, keep the newest
            let mut best: Option<Record> = None;
            for head in self.heads.iter_mut() {
                if !matches!(head, Some(r) if r.key == min_key) {
                    continue;
                }
                if let Some(record) = head.take() {
                    best = match best {
                        Some(b) if b.version >= record.version => Some(b),
                        _ => Some(record),
                    };
                }
            }

            match best {
                Some(record) if record.is_tombstone() && !self.include_tombstones => continue,
                Some(record) => return Some(Ok(record)),
                None => continue,
            }
        }
    }
}
