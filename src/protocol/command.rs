//! Command definitions
//!
//! Requests from clients and from other nodes.

use serde::{Deserialize, Serialize};

use crate::cluster::{ClientRequest, Consistency};
use crate::record::Version;

/// Command types (first byte of every request frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    Scan = 0x05,
    Forward = 0x10,
    ReplicatePut = 0x20,
    ReplicateDelete = 0x21,
    ReplicateGet = 0x22,
}

impl CommandType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let t = match byte {
            0x01 => CommandType::Get,
            0x02 => CommandType::Put,
            0x03 => CommandType::Delete,
            0x04 => CommandType::Ping,
            0x05 => CommandType::Scan,
            0x10 => CommandType::Forward,
            0x20 => CommandType::ReplicatePut,
            0x21 => CommandType::ReplicateDelete,
            0x22 => CommandType::ReplicateGet,
            _ => return None,
        };
        Some(t)
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Get a value by key
    Get {
        key: Vec<u8>,
        consistency: Option<Consistency>,
    },

    /// Put a key-value pair
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        consistency: Option<Consistency>,
    },

    /// Delete a key
    Delete {
        key: Vec<u8>,
        consistency: Option<Consistency>,
    },

    /// Live records of the receiving node in `[start, end)`, ascending
    Scan {
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        /// Resume strictly after this key (bookmark of a previous page)
        after: Option<Vec<u8>>,
        limit: Option<u32>,
    },

    /// Ping (health check)
    Ping,

    /// Client request routed here by another node; coordinate, don't re-route
    Forward(ClientRequest),

    /// Inter-node: install a versioned value
    ReplicatePut {
        key: Vec<u8>,
        value: Vec<u8>,
        version: Version,
    },

    /// Inter-node: install a versioned tombstone
    ReplicateDelete { key: Vec<u8>, version: Version },

    /// Inter-node: newest local record, tombstones included
    ReplicateGet { key: Vec<u8> },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Put { .. } => CommandType::Put,
            Command::Delete { .. } => CommandType::Delete,
            Command::Scan { .. } => CommandType::Scan,
            Command::Ping => CommandType::Ping,
            Command::Forward(_) => CommandType::Forward,
            Command::ReplicatePut { .. } => CommandType::ReplicatePut,
            Command::ReplicateDelete { .. } => CommandType::ReplicateDelete,
            Command::ReplicateGet { .. } => CommandType::ReplicateGet,
        }
    }

    /// Client GET with the cluster default consistency
    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Command::Get {
            key: key.into(),
            consistency: None,
        }
    }

    /// Client PUT with the cluster default consistency
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Command::Put {
            key: key.into(),
            value: value.into(),
            consistency: None,
        }
    }

    /// Client DELETE with the cluster default consistency
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Command::Delete {
            key: key.into(),
            consistency: None,
        }
    }

    /// The client request carried by GET/PUT/DELETE/FORWARD
    pub fn into_client_request(self) -> Option<ClientRequest> {
        let request = match self {
            Command::Get { key, consistency } => ClientRequest {
                key,
                op: crate::cluster::ClientOp::Get,
                consistency,
            },
            Command::Put {
                key,
                value,
                consistency,
            } => ClientRequest {
                key,
                op: crate::cluster::ClientOp::Put(value),
                consistency,
            },
            Command::Delete { key, consistency } => ClientRequest {
                key,
                op: crate::cluster::ClientOp::Delete,
                consistency,
            },
            Command::Forward(request) => request,
            _ => return None,
        };
        Some(request)
    }
}
