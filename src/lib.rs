//! # shardkv
//!
//! A replicated, partitioned key-value store with:
//! - Consistent hashing to spread keys over nodes
//! - Tunable `{N, R, W}` quorums per request
//! - Last-write-wins conflict resolution with read repair
//! - A log-structured storage engine per node (WAL, MemTable, segments, compaction)
//! - TCP-based client and node-to-node protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (clients and peer nodes)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Router                                     │
//! │       (coordinate here, or forward to an owner)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Coordinator                                  │
//! │   Ring + Membership → owners, parallel fan-out, quorum       │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │ local                        │ remote (REPLICATE_*)
//!            ▼                              ▼
//!   ┌─────────────────┐              other nodes
//!   │     Engine      │
//!   │ WAL → MemTable  │
//!   │   → Segments    │
//!   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;
pub mod record;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod cluster;
pub mod protocol;
pub mod network;
pub mod node;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ShardError};
pub use config::{Config, PeerConfig, WalSyncStrategy};
pub use engine::Engine;
pub use node::Node;
pub use record::{NodeId, Record, Value, Version};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
