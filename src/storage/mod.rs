//! Storage Module
//!
//! Persistent storage layer: immutable sorted segments plus the manifest
//! that names the live generation.
//!
//! ## Responsibilities
//! - Persist flushed MemTables as sorted, checksummed segment files
//! - Point lookups newest → oldest, short-circuiting on the first hit
//! - Ordered range scans over a pinned generation
//! - Compaction: merge segments, keep the highest version per key, drop
//!   tombstones past the horizon
//!
//! ## Layout
//! ```text
//! {data_dir}/segments/
//!   ├── MANIFEST              (generation, next id, live segment ids)
//!   ├── segment_000001.sst
//!   └── segment_000002.sst
//! ```
//!
//! The segment file format is described in `sstable/mod.rs`.

mod manager;
mod manifest;
mod merge;
mod scan;
mod sstable;

pub use manager::{CompactionStats, SegmentSet, StorageManager};
pub use manifest::{Manifest, MANIFEST_FILENAME};
pub use merge::{MergeIterator, RecordSource};
pub use scan::{KeyRange, Scan};
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
