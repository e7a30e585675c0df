//! Error types for shardkv
//!
//! Provides a unified error type for all operations, local and cluster-wide.

use thiserror::Error;

use crate::cluster::NodeStatus;
use crate::record::NodeId;

/// Result type alias using ShardError
pub type Result<T> = std::result::Result<T, ShardError>;

/// Unified error type for shardkv operations
#[derive(Debug, Error)]
pub enum ShardError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Cluster Errors
    // -------------------------------------------------------------------------
    /// Quorum not met and at least the missing replicas definitely failed
    #[error("Quorum not met: {acks} of {required} required acknowledgments")]
    PartialFailure { acks: usize, required: usize },

    /// Deadline elapsed while some replicas were still in flight
    #[error("Timed out with {acks} of {required} required acknowledgments")]
    Timeout { acks: usize, required: usize },

    /// Not enough live owners to even attempt the operation
    #[error("Not enough live owners: {live} available, {required} required")]
    NodeUnavailable { live: usize, required: usize },

    #[error("Invalid consistency level: {0}")]
    InvalidConsistency(String),

    #[error("Invalid membership transition for {node}: {from:?} -> {to:?}")]
    InvalidTransition {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Too many calls to one replica are already queued
    #[error("Replica {0} is overloaded")]
    Overloaded(NodeId),
}

impl From<bincode::Error> for ShardError {
    fn from(err: bincode::Error) -> Self {
        ShardError::Serialization(err.to_string())
    }
}

impl ShardError {
    /// True for errors that mean "the cluster could not reach quorum", as
    /// opposed to local failures of this node.
    pub fn is_quorum_error(&self) -> bool {
        matches!(
            self,
            ShardError::PartialFailure { .. }
                | ShardError::Timeout { .. }
                | ShardError::NodeUnavailable { .. }
        )
    }
}
