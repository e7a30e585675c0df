//! Engine Module
//!
//! The node-local storage engine that coordinates WAL, MemTable and segments.
//!
//! ## Responsibilities
//! - Last-write-wins apply of versioned records
//! - Log every accepted write before it becomes visible
//! - Trigger flushes when MemTable is full, and compactions when segments pile up
//! - Manage crash recovery on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::memtable::MemTable;
use crate::record::{Record, Version};
use crate::storage::{CompactionStats, KeyRange, Scan, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The storage engine of one node
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush): Serialized by `write_lock`
///   - Only ONE write operation at a time, so per-key order equals log order
///   - Must acquire: write_lock → WAL → memtable → storage
///
/// - **Reads** (get/scan): never take `write_lock`
///   - MemTable uses internal RwLock (many concurrent readers)
///   - Segments are read through a pinned, immutable generation
///
/// - **Compaction**: runs outside `write_lock`; writes and flushes proceed
///   while segments are merged. Once a compactor thread is attached through
///   [`Engine::compaction_requests`], writes only signal it.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for segment files and the manifest
    storage_dir: PathBuf,

    /// Logical clock of this node, advanced past every applied version
    clock: Arc<Clock>,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager
    storage: StorageManager,

    /// Serializes write operations (apply/flush)
    write_lock: Mutex<()>,

    /// At most one pending compaction request for the attached compactor
    compaction_tx: Sender<()>,
    compaction_rx: Receiver<()>,
    compactor_attached: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SEGMENT_DIR: &'static str = "segments";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load the live segment generation
    /// 3. Replay the WAL into the MemTable, flush it, truncate the WAL
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        // Paths are derived from data_dir, not configurable
        let storage_dir = config.data_dir.join(Self::SEGMENT_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();
        let clock = Arc::new(Clock::new());

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}, truncated={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn,
                    recovery.was_truncated
                );
            }

            for entry in entries {
                clock.observe(entry.operation.version().timestamp);
                memtable.apply(entry.operation.into_record());
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        // Recovered writes become durable in a segment before the log is cleared
        if !memtable.is_empty() {
            tracing::info!(
                "Flushing {} recovered entries to a segment",
                memtable.entry_count()
            );
            storage.flush(&memtable)?;
            memtable.clear();
            wal.truncate()?;
        }

        let (compaction_tx, compaction_rx) = channel::bounded(1);

        Ok(Self {
            config,
            storage_dir,
            clock,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            compaction_tx,
            compaction_rx,
            compactor_attached: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the winning record for a key, tombstones included
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Segments (newest to oldest), first hit wins
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if let Some(record) = self.memtable.get_record(key) {
            return Ok(Some(record));
        }
        self.storage.get(key)
    }

    /// Get the live value for a key (`None` if absent or deleted)
    pub fn get_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key)?.and_then(|r| r.value.into_bytes()))
    }

    /// Ordered scan of live records in `range`
    pub fn scan(&self, range: KeyRange) -> Result<Scan> {
        self.scan_limit(range, None)
    }

    /// Ordered scan yielding at most `limit` records
    pub fn scan_limit(&self, range: KeyRange, limit: Option<usize>) -> Result<Scan> {
        // MemTable first: a flush racing with us then shows up in the pinned set
        let recent = self.memtable.range(&range);
        let segments = self.storage.pin();
        Ok(Scan::new(recent, segments, &range, limit))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Put a key-value pair at `version`
    ///
    /// Returns false if a newer or equal version is already stored; the
    /// write is then acknowledged without being logged.
    pub fn put(&self, key: &[u8], value: &[u8], version: Version) -> Result<bool> {
        self.apply(Record::put(key, value, version))
    }

    /// Write a tombstone for a key at `version`
    pub fn delete(&self, key: &[u8], version: Version) -> Result<bool> {
        self.apply(Record::tombstone(key, version))
    }

    /// Install a record under last-write-wins
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Compare against the visible version (stale → no-op)
    /// 3. Write to WAL (durability; an error fails this write)
    /// 4. Write to MemTable
    /// 5. Flush and maybe compact
    ///
    /// The write counts as applied once steps 3 and 4 succeed. Flush and
    /// compaction failures after that point are logged; the memtable keeps
    /// the data and the next write retries the flush.
    pub fn apply(&self, record: Record) -> Result<bool> {
        let flushed = {
            let _write_guard = self.write_lock.lock();

            if let Some(current) = self.get(&record.key)? {
                if current.version >= record.version {
                    tracing::trace!(
                        "Ignoring stale write for {:?}: {:?} <= {:?}",
                        String::from_utf8_lossy(&record.key),
                        record.version,
                        current.version
                    );
                    return Ok(false);
                }
            }

            self.wal.lock().append(Operation::from(&record))?;

            self.clock.observe(record.version.timestamp);
            self.memtable.apply(record);

            if self.memtable.should_flush(self.config.memtable_size_limit) {
                match self.flush_internal() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Flush after write failed: {}", e);
                        false
                    }
                }
            } else {
                false
            }
        };

        if flushed {
            self.request_compaction();
        }
        Ok(true)
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in a segment
        self.wal.lock().truncate()?;

        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Merge all segments now
    pub fn compact(&self) -> Result<Option<CompactionStats>> {
        let horizon_micros = self.config.tombstone_horizon_ms.saturating_mul(1000);
        let cutoff = self.clock.now().saturating_sub(horizon_micros);
        self.storage.compact(cutoff)
    }

    /// Signals fired when a flush may have made compaction due
    ///
    /// Attaches a compactor: from now on writes no longer compact inline and
    /// the holder is expected to call [`Engine::maybe_compact`] per signal.
    pub fn compaction_requests(&self) -> Receiver<()> {
        self.compactor_attached.store(true, Ordering::Release);
        self.compaction_rx.clone()
    }

    /// Go back to compacting on the write path
    pub fn detach_compactor(&self) {
        self.compactor_attached.store(false, Ordering::Release);
    }

    fn request_compaction(&self) {
        if self.compactor_attached.load(Ordering::Acquire) {
            // Full means a request is already pending
            let _ = self.compaction_tx.try_send(());
        } else if let Err(e) = self.maybe_compact() {
            tracing::error!("Compaction after flush failed: {}", e);
        }
    }

    /// Compact if the segment count reached the configured trigger
    pub fn maybe_compact(&self) -> Result<Option<CompactionStats>> {
        let trigger = self.config.compaction_trigger;
        if trigger == 0 || self.storage.segment_count() < trigger.max(2) {
            return Ok(None);
        }
        self.compact()
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where segments are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of live segments
    pub fn segment_count(&self) -> usize {
        self.storage.segment_count()
    }

    /// Current segment generation
    pub fn generation(&self) -> u64 {
        self.storage.generation()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
