//! Range scans
//!
//! A scan reads a snapshot of the MemTable plus one pinned segment
//! generation. Pinning keeps every segment of that generation on disk
//! until the scan is dropped, even if a compaction retires them meanwhile.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::record::Record;

use super::manager::SegmentSet;
use super::merge::{MergeIterator, RecordSource};

/// Half-open key range `[start, end)`
///
/// `start` may also be exclusive, which is how a scan resumes after a bookmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    start: Bound<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl KeyRange {
    /// Every key
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: None,
        }
    }

    /// Keys `>= start`
    pub fn from(start: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: None,
        }
    }

    /// Keys in `[start, end)`
    pub fn between(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Some(end.into()),
        }
    }

    /// Build from optional wire bounds (`None` start means from the beginning)
    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start.map_or(Bound::Unbounded, Bound::Included),
            end,
        }
    }

    /// Same range, restarted strictly after `bookmark`
    pub fn resume_after(self, bookmark: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Excluded(bookmark.into()),
            end: self.end,
        }
    }

    pub fn start(&self) -> &Bound<Vec<u8>> {
        &self.start
    }

    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(s) => key >= s.as_slice(),
            Bound::Excluded(s) => key > s.as_slice(),
            Bound::Unbounded => true,
        };
        let before_end = match &self.end {
            Some(e) => key < e.as_slice(),
            None => true,
        };
        after_start && before_end
    }

    /// True if no key can fall inside the range
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Some(e)) | (Bound::Excluded(s), Some(e)) => s >= e,
            _ => false,
        }
    }

    /// Bounds in the form `BTreeMap::range` accepts
    ///
    /// Callers must check `is_empty()` first: an inverted range makes
    /// `BTreeMap::range` panic.
    pub fn bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let end = match &self.end {
            Some(e) => Bound::Excluded(e.clone()),
            None => Bound::Unbounded,
        };
        (self.start.clone(), end)
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Lazy, ordered sequence of live records
///
/// Tombstones are resolved against older values and then hidden. The scan
/// is finite; `bookmark()` plus `KeyRange::resume_after` restarts it.
pub struct Scan {
    inner: MergeIterator,
    /// Pinned segment generation
    segments: Arc<SegmentSet>,
    remaining: Option<usize>,
    bookmark: Option<Vec<u8>>,
}

impl Scan {
    pub(crate) fn new(
        memtable: Vec<Record>,
        segments: Arc<SegmentSet>,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> Self {
        let mut sources: Vec<RecordSource> = Vec::with_capacity(segments.len() + 1);
        sources.push(Box::new(memtable.into_iter().map(Ok)));
        for segment in segments.segments() {
            sources.push(Box::new(segment.range(range)));
        }

        Self {
            inner: MergeIterator::new(sources, false),
            segments,
            remaining: limit,
            bookmark: None,
        }
    }

    /// Last key yielded, if any
    pub fn bookmark(&self) -> Option<&[u8]> {
        self.bookmark.as_deref()
    }

    /// Generation of the segment set this scan reads
    pub fn generation(&self) -> u64 {
        self.segments.generation()
    }

    /// Drain into a vector, stopping at the first error
    pub fn collect_records(self) -> Result<Vec<Record>> {
        self.collect()
    }
}

impl Iterator for Scan {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        let item = self.inner.next()?;
        if let Ok(record) = &item {
            self.bookmark = Some(record.key.clone());
            if let Some(n) = self.remaining.as_mut() {
                *n -= 1;
            }
        }
        Some(item)
    }
}
