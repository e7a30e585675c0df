//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use serde::{Deserialize, Serialize};

use crate::clock::wall_micros;
use crate::error::{Result, ShardError};
use crate::record::{Record, Value, Version};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry's data section (64 MB)
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Wall clock (unix micros) when the entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        version: Version,
    },

    /// Write a tombstone for a key
    Delete { key: Vec<u8>, version: Version },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key, .. } => key,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Operation::Put { version, .. } | Operation::Delete { version, .. } => version,
        }
    }

    /// The record this operation installs
    pub fn into_record(self) -> Record {
        match self {
            Operation::Put {
                key,
                value,
                version,
            } => Record::put(key, value, version),
            Operation::Delete { key, version } => Record::tombstone(key, version),
        }
    }
}

impl From<&Record> for Operation {
    fn from(record: &Record) -> Self {
        match &record.value {
            Value::Present(value) => Operation::Put {
                key: record.key.clone(),
                value: value.clone(),
                version: record.version.clone(),
            },
            Value::Tombstone => Operation::Delete {
                key: record.key.clone(),
                version: record.version.clone(),
            },
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self {
            lsn,
            operation,
            timestamp: wall_micros(),
        }
    }

    /// Encode as a complete frame (header + data)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        if data.len() > MAX_ENTRY_SIZE {
            return Err(ShardError::WalWrite(format!(
                "entry of {} bytes exceeds the {} byte limit",
                data.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&Self::compute_crc(&data).to_le_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Decode a complete frame, checking the CRC and the LSN in the header
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ShardError::WalCorruption(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE]);
        let data = bytes
            .get(HEADER_SIZE..HEADER_SIZE + len)
            .ok_or_else(|| {
                ShardError::WalCorruption(format!(
                    "frame declares {} data bytes, only {} present",
                    len,
                    bytes.len() - HEADER_SIZE
                ))
            })?;
        Self::decode_data(lsn, crc, data)
    }

    /// Split a header into (lsn, crc, data length)
    pub(crate) fn parse_header(header: &[u8]) -> (u64, u32, usize) {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&header[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len) as usize,
        )
    }

    /// Validate and decode the data section of a frame
    pub(crate) fn decode_data(lsn: u64, crc: u32, data: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(data);
        if actual != crc {
            return Err(ShardError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }
        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| ShardError::WalCorruption(format!("undecodable entry: {}", e)))?;
        if entry.lsn != lsn {
            return Err(ShardError::WalCorruption(format!(
                "header LSN {} does not match entry LSN {}",
                lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    pub fn compute_crc(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
