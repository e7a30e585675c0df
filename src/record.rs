//! Records and versions
//!
//! A record is the unit of replication: a key, a value or a tombstone, and the
//! version that decides which of two concurrent writes wins.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a cluster member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// Version of a write
///
/// Ordered by timestamp first; equal timestamps fall back to the origin node
/// id so every replica picks the same winner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub timestamp: u64,
    pub origin: NodeId,
}

impl Version {
    pub fn new(timestamp: u64, origin: impl Into<NodeId>) -> Self {
        Self {
            timestamp,
            origin: origin.into(),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.origin.cmp(&other.origin))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Payload of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// A live value
    Present(Vec<u8>),

    /// A deletion marker
    Tombstone,
}

impl Value {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Value::Tombstone)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Present(v) => Some(v),
            Value::Tombstone => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Present(v) => Some(v),
            Value::Tombstone => None,
        }
    }

    /// Payload length in bytes (0 for tombstones)
    pub fn len(&self) -> usize {
        self.as_bytes().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A versioned key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Value,
    pub version: Version,
}

impl Record {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, version: Version) -> Self {
        Self {
            key: key.into(),
            value: Value::Present(value.into()),
            version,
        }
    }

    pub fn tombstone(key: impl Into<Vec<u8>>, version: Version) -> Self {
        Self {
            key: key.into(),
            value: Value::Tombstone,
            version,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_tombstone()
    }

    /// True if `self` should replace `other` under last-write-wins
    pub fn supersedes(&self, other: &Record) -> bool {
        self.version > other.version
    }
}

/// Pick the newest of a set of optional records.
///
/// `None` entries (NotFound answers) never win over a record.
pub fn newest<'a, I>(records: I) -> Option<&'a Record>
where
    I: IntoIterator<Item = &'a Option<Record>>,
{
    records
        .into_iter()
        .flatten()
        .max_by(|a, b| a.version.cmp(&b.version))
}
