//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.
//! Lookups take `&self`: the file handle sits behind a mutex, so one reader
//! can be shared by many concurrent gets and scans.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, ShardError};
use crate::record::{NodeId, Record, Value, Version};
use crate::storage::KeyRange;

use super::iterator::SSTableIterator;
use super::{ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
#[derive(Debug)]
pub struct SSTableReader {
    /// Segment id parsed from the file name (0 if the name has none)
    id: u64,
    path: PathBuf,
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    file_size: u64,
    /// Set once a compaction replaced this segment; the file is removed on drop
    retired: AtomicBool,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and data checksum, then loads the entire index into
    /// memory for fast lookups.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(ShardError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(ShardError::Storage(format!(
                "Invalid SSTable magic: expected SHKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(ShardError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header[6..14]);

        // Read footer to get index offset
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer[0..8]);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(ShardError::Storage(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        // Verify data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }
        let actual_crc = hasher.finalize();
        if actual_crc != data_crc {
            return Err(ShardError::Storage(format!(
                "SSTable {} data checksum mismatch: expected {:08x}, got {:08x}",
                path.display(),
                data_crc,
                actual_crc
            )));
        }

        // Load index into memory: [key_len(4)][offset(8)][key]
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(ShardError::Storage(format!(
                    "SSTable {} has a truncated index entry",
                    path.display()
                )));
            }
            let key_len = le_u32(&index_data[pos..pos + 4]) as usize;
            let offset = le_u64(&index_data[pos + 4..pos + 12]);
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(ShardError::Storage(format!(
                    "SSTable {} has a truncated index key",
                    path.display()
                )));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(ShardError::Storage(format!(
                "SSTable {} header claims {} entries, index holds {}",
                path.display(),
                entry_count,
                index.len()
            )));
        }

        Ok(Self {
            id: parse_segment_id(path).unwrap_or(0),
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            file_size,
            retired: AtomicBool::new(false),
        })
    }

    /// Record for a key, O(log n) lookup via the in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(record))`: key present (the record may be a tombstone)
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        match self.index.get(key) {
            Some(&offset) => self.read_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the entry stored at `offset`
    pub fn read_at(&self, offset: u64) -> Result<Record> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        decode_entry(&mut *file)
    }

    /// Keys and offsets inside `range`, in order
    pub fn offsets_in(&self, range: &KeyRange) -> Vec<u64> {
        if range.is_empty() {
            return Vec::new();
        }
        self.index
            .range::<Vec<u8>, _>(range.bounds())
            .map(|(_, &offset)| offset)
            .collect()
    }

    /// Iterate the records inside `range` (lazily read from disk)
    pub fn range(self: &Arc<Self>, range: &KeyRange) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), self.offsets_in(range))
    }

    /// Iterate all records (for compaction, debugging)
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        self.range(&KeyRange::all())
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// Mark this segment as replaced; its file goes away with the last reference
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

impl Drop for SSTableReader {
    fn drop(&mut self) {
        if !self.is_retired() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed retired segment {}", self.path.display()),
            Err(e) => tracing::warn!(
                "Failed to remove retired segment {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Segment id from a file name: "segment_000042.sst" → Some(42)
pub(crate) fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != "sst" {
        return None;
    }
    let name = path.file_stem()?.to_string_lossy();
    name.strip_prefix("segment_")?.parse().ok()
}

/// Decode one data-block entry from the current position of `reader`
pub(super) fn decode_entry<R: Read>(reader: &mut R) -> Result<Record> {
    let mut header = [0u8; ENTRY_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let key_len = le_u32(&header[0..4]) as usize;
    let val_len = le_u32(&header[4..8]);
    let timestamp = le_u64(&header[8..16]);
    let origin_len = u16::from_le_bytes([header[16], header[17]]) as usize;

    let mut origin = vec![0u8; origin_len];
    reader.read_exact(&mut origin)?;
    let origin = String::from_utf8(origin)
        .map_err(|_| ShardError::Storage("segment entry has a non-UTF-8 node id".into()))?;

    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;

    let value = if val_len == TOMBSTONE_MARKER {
        Value::Tombstone
    } else {
        let mut v = vec![0u8; val_len as usize];
        reader.read_exact(&mut v)?;
        Value::Present(v)
    };

    Ok(Record {
        key,
        value,
        version: Version::new(timestamp, NodeId(origin)),
    })
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
