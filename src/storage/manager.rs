//! Storage Manager
//!
//! Manages the segment files of one node and coordinates reads, flushes and
//! compaction.
//!
//! ## Responsibilities
//! - Reopen the segment generation recorded in the manifest on startup
//! - Search segments newest → oldest for reads
//! - Create new segments from MemTable flushes
//! - Merge segments and retire the replaced ones

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, ShardError};
use crate::memtable::MemTable;
use crate::record::Record;

use super::manifest::Manifest;
use super::merge::{MergeIterator, RecordSource};
use super::sstable::parse_segment_id;
use super::{SSTable, SSTableBuilder, SSTableReader};

/// One immutable generation of the segment list
///
/// Readers pin a generation by cloning the `Arc`; the segments it names stay
/// readable until every pin is dropped.
#[derive(Default)]
pub struct SegmentSet {
    generation: u64,
    /// Ordered newest → oldest
    segments: Vec<Arc<SSTableReader>>,
}

impl SegmentSet {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn segments(&self) -> &[Arc<SSTableReader>] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Newest record for `key` across the set, tombstones included
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        for segment in &self.segments {
            // Skip segment if key is outside its range (O(1) check)
            if !segment.might_contain(key) {
                continue;
            }
            if let Some(record) = segment.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn ids(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.id()).collect()
    }
}

/// Outcome of one compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Generation installed by this compaction
    pub generation: u64,
    pub segments_merged: usize,
    pub records_in: u64,
    pub records_out: u64,
    pub tombstones_dropped: u64,
    /// Id of the output segment (None if everything was dropped)
    pub output_segment: Option<u64>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `current`: the live `SegmentSet`, swapped whole under a short write lock
/// - `manifest`: serializes generation changes (flush and compaction installs)
/// - `compaction_lock`: at most one compaction at a time
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    /// Directory where segments and the manifest are stored
    data_dir: PathBuf,

    current: RwLock<Arc<SegmentSet>>,

    manifest: Mutex<Manifest>,

    /// Next ID for creating new segments (atomic, lock-free)
    next_segment_id: AtomicU64,

    compaction_lock: Mutex<()>,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Load the manifest (or discover segment files if there is none)
    /// 3. Remove segment files the manifest does not list
    /// 4. Open readers for each listed segment (loads indexes into RAM)
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Manifest::clean_tmp(path)?;

        // Discover existing segment files, dropping unfinished compaction output
        let mut on_disk: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if file_path.extension().map_or(false, |e| e == "tmp") {
                tracing::warn!("Removing unfinished segment {}", file_path.display());
                fs::remove_file(&file_path)?;
                continue;
            }
            if let Some(id) = parse_segment_id(&file_path) {
                on_disk.push(id);
            }
        }
        on_disk.sort_unstable_by(|a, b| b.cmp(a));

        let max_on_disk = on_disk.first().copied().unwrap_or(0);
        let mut manifest = match Manifest::load(path)? {
            Some(manifest) => {
                let live: HashSet<u64> = manifest.segments.iter().copied().collect();
                for id in on_disk.iter().filter(|id| !live.contains(id)) {
                    let orphan = Self::segment_path_with_dir(path, *id);
                    tracing::warn!("Removing orphan segment {}", orphan.display());
                    fs::remove_file(&orphan)?;
                }
                manifest
            }
            None => {
                // Fresh directory, or one written before manifests existed
                let manifest = Manifest {
                    generation: 0,
                    next_segment_id: max_on_disk + 1,
                    segments: on_disk.clone(),
                };
                manifest.save(path)?;
                manifest
            }
        };
        manifest.next_segment_id = manifest.next_segment_id.max(max_on_disk + 1).max(1);

        let mut segments = Vec::with_capacity(manifest.segments.len());
        for id in &manifest.segments {
            let segment_path = Self::segment_path_with_dir(path, *id);
            if !segment_path.exists() {
                return Err(ShardError::Storage(format!(
                    "manifest lists missing segment {}",
                    segment_path.display()
                )));
            }
            segments.push(Arc::new(SSTableReader::open(&segment_path)?));
        }

        tracing::info!(
            "Opened storage at {}: generation {}, {} segments",
            path.display(),
            manifest.generation,
            segments.len()
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            current: RwLock::new(Arc::new(SegmentSet {
                generation: manifest.generation,
                segments,
            })),
            next_segment_id: AtomicU64::new(manifest.next_segment_id),
            manifest: Mutex::new(manifest),
            compaction_lock: Mutex::new(()),
        })
    }

    /// Pin the current generation
    pub fn pin(&self) -> Arc<SegmentSet> {
        Arc::clone(&self.current.read())
    }

    /// Get the newest record for a key (searches segments newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(record))`: key found (possibly a tombstone)
    /// - `Ok(None)`: key not in any segment
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        self.pin().get(key)
    }

    /// Flush a MemTable to a new segment
    ///
    /// Creates a new segment file from the MemTable's sorted entries, opens a
    /// reader for it, and installs it at the front of a new generation.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        // Skip if MemTable is empty
        if memtable.is_empty() {
            return Err(ShardError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_segment_id.fetch_add(1, Ordering::SeqCst);
        let path = self.segment_path(id);

        // Create builder and write entries (already sorted from BTreeMap)
        let mut builder = SSTableBuilder::new(&path)?;
        for record in memtable.iter() {
            builder.add(&record)?;
        }
        let metadata = builder.finish()?;
        let reader = Arc::new(SSTableReader::open(&path)?);

        let generation = self.install(|current| {
            let mut segments = Vec::with_capacity(current.len() + 1);
            segments.push(Arc::clone(&reader));
            segments.extend(current.segments.iter().cloned());
            segments
        })?;

        tracing::debug!(
            "Flushed {} records to segment {} (generation {})",
            metadata.entry_count,
            id,
            generation
        );
        Ok(metadata)
    }

    /// Merge every segment of the current generation into one
    ///
    /// Duplicate keys resolve to the highest version. Tombstones whose
    /// timestamp is below `tombstone_cutoff` are dropped. Segments flushed
    /// while the merge runs stay in front of the output.
    ///
    /// Returns `None` when there is nothing to merge (fewer than 2 segments).
    pub fn compact(&self, tombstone_cutoff: u64) -> Result<Option<CompactionStats>> {
        let _compaction = self.compaction_lock.lock();

        let input = self.pin();
        if input.len() < 2 {
            return Ok(None);
        }

        let id = self.next_segment_id.fetch_add(1, Ordering::SeqCst);
        let final_path = self.segment_path(id);
        let tmp_path = final_path.with_extension("sst.tmp");

        let mut stats = CompactionStats {
            segments_merged: input.len(),
            records_in: input.segments.iter().map(|s| s.entry_count()).sum(),
            ..Default::default()
        };

        let sources: Vec<RecordSource> = input
            .segments
            .iter()
            .map(|s| Box::new(s.iter()) as RecordSource)
            .collect();

        let mut builder = SSTableBuilder::new(&tmp_path)?;
        for record in MergeIterator::new(sources, true) {
            let record = record?;
            if record.is_tombstone() && record.version.timestamp < tombstone_cutoff {
                stats.tombstones_dropped += 1;
                continue;
            }
            builder.add(&record)?;
        }
        stats.records_out = builder.entry_count();

        let output = if stats.records_out > 0 {
            builder.finish()?;
            fs::rename(&tmp_path, &final_path)?;
            stats.output_segment = Some(id);
            Some(Arc::new(SSTableReader::open(&final_path)?))
        } else {
            drop(builder);
            fs::remove_file(&tmp_path)?;
            None
        };

        let replaced: HashSet<u64> = input.ids().into_iter().collect();
        stats.generation = self.install(|current| {
            let mut segments: Vec<Arc<SSTableReader>> = current
                .segments
                .iter()
                .filter(|s| !replaced.contains(&s.id()))
                .cloned()
                .collect();
            segments.extend(output.iter().cloned());
            segments
        })?;

        // Files go away once the last pinned generation lets go of them
        for segment in input.segments() {
            segment.retire();
        }

        tracing::info!(
            "Compacted {} segments ({} records) into {} records, dropped {} tombstones, generation {}",
            stats.segments_merged,
            stats.records_in,
            stats.records_out,
            stats.tombstones_dropped,
            stats.generation
        );
        Ok(Some(stats))
    }

    /// Get the number of live segments
    pub fn segment_count(&self) -> usize {
        self.current.read().len()
    }

    /// Current generation number
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next segment ID (for testing/debugging)
    pub fn next_segment_id(&self) -> u64 {
        self.next_segment_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Build the next generation from the current one, persist it, then swap it in
    fn install<F>(&self, build: F) -> Result<u64>
    where
        F: FnOnce(&SegmentSet) -> Vec<Arc<SSTableReader>>,
    {
        let mut manifest = self.manifest.lock();
        let current = self.pin();
        let next = SegmentSet {
            generation: current.generation + 1,
            segments: build(&current),
        };

        let updated = Manifest {
            generation: next.generation,
            next_segment_id: self.next_segment_id.load(Ordering::SeqCst),
            segments: next.ids(),
        };
        updated.save(&self.data_dir)?;
        *manifest = updated;

        let generation = next.generation;
        *self.current.write() = Arc::new(next);
        Ok(generation)
    }

    /// Generate the file path for a segment with given ID
    fn segment_path(&self, id: u64) -> PathBuf {
        Self::segment_path_with_dir(&self.data_dir, id)
    }

    /// Generate segment path given a directory and ID
    fn segment_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("segment_{:06}.sst", id))
    }
}
