//! Configuration for shardkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::Consistency;
use crate::error::{Result, ShardError};
use crate::record::NodeId;

/// Main configuration for a shardkv node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, segments, manifest)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── segments/        (segment files + MANIFEST)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable / Compaction Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// Number of segments that triggers a compaction after a flush (0 = never)
    pub compaction_trigger: usize,

    /// Period of the background compactor (milliseconds, 0 = disabled)
    pub compaction_interval_ms: u64,

    /// Tombstones older than this are dropped by compaction (milliseconds)
    pub tombstone_horizon_ms: u64,

    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// Identifier of this node, unique in the cluster
    pub node_id: NodeId,

    /// The other members of the cluster
    pub peers: Vec<PeerConfig>,

    /// Replication factor N
    pub replication_factor: usize,

    /// Default read quorum R (None = majority of N)
    pub read_quorum: Option<usize>,

    /// Default write quorum W (None = majority of N)
    pub write_quorum: Option<usize>,

    /// Overall deadline of one coordinated operation (milliseconds)
    pub request_timeout_ms: u64,

    /// Ring positions per node
    pub virtual_nodes: usize,

    /// Failure detector ping period (milliseconds, 0 = disabled)
    pub heartbeat_interval_ms: u64,

    /// Consecutive missed heartbeats before a node becomes SUSPECT
    pub suspect_after_misses: u32,

    /// Time a node may stay SUSPECT while still missing heartbeats before DEAD
    pub dead_after_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Address book entry for another cluster member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub id: NodeId,
    pub addr: String,
}

impl PeerConfig {
    pub fn new(id: impl Into<NodeId>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }

    /// Parse the `id=host:port` form used on the command line
    pub fn parse(arg: &str) -> Result<Self> {
        let (id, addr) = arg.split_once('=').ok_or_else(|| {
            ShardError::Config(format!("peer must look like id=host:port, got {:?}", arg))
        })?;
        if id.is_empty() || addr.is_empty() {
            return Err(ShardError::Config(format!("empty peer id or address in {:?}", arg)));
        }
        Ok(Self::new(id, addr))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./shardkv_data"),
            // Writes are acknowledged only once they are durable in the log
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            compaction_trigger: 4,
            compaction_interval_ms: 60_000,
            tombstone_horizon_ms: 24 * 60 * 60 * 1000, // 1 day
            node_id: NodeId::from("node-1"),
            peers: Vec::new(),
            replication_factor: 3,
            read_quorum: None,
            write_quorum: None,
            request_timeout_ms: 1000,
            virtual_nodes: 64,
            heartbeat_interval_ms: 1000,
            suspect_after_misses: 3,
            dead_after_ms: 5000,
            listen_addr: "127.0.0.1:7400".to_string(),
            max_connections: 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Number of nodes in the static topology (self included)
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Cluster-wide default consistency
    ///
    /// N is capped at the cluster size; unset quorums default to a majority.
    pub fn default_consistency(&self) -> Result<Consistency> {
        let n = self.replication_factor.min(self.cluster_size());
        let majority = n / 2 + 1;
        Consistency::new(
            n,
            self.read_quorum.unwrap_or(majority),
            self.write_quorum.unwrap_or(majority),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Cross-field checks
    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(ShardError::Config("replication factor must be at least 1".into()));
        }
        if self.virtual_nodes == 0 {
            return Err(ShardError::Config("virtual_nodes must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ShardError::Config("request timeout must be positive".into()));
        }
        if self.peers.iter().any(|p| p.id == self.node_id) {
            return Err(ShardError::Config(format!(
                "node {} is listed as its own peer",
                self.node_id
            )));
        }
        let mut ids: Vec<&NodeId> = self.peers.iter().map(|p| &p.id).collect();
        ids.sort();
        ids.dedup();
        if ids.len() != self.peers.len() {
            return Err(ShardError::Config("duplicate peer ids".into()));
        }
        self.default_consistency()
            .map_err(|e| ShardError::Config(e.to_string()))?;
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn compaction_trigger(mut self, segments: usize) -> Self {
        self.config.compaction_trigger = segments;
        self
    }

    pub fn compaction_interval_ms(mut self, ms: u64) -> Self {
        self.config.compaction_interval_ms = ms;
        self
    }

    pub fn tombstone_horizon_ms(mut self, ms: u64) -> Self {
        self.config.tombstone_horizon_ms = ms;
        self
    }

    /// Set this node's identifier
    pub fn node_id(mut self, id: impl Into<NodeId>) -> Self {
        self.config.node_id = id.into();
        self
    }

    /// Add one peer
    pub fn peer(mut self, id: impl Into<NodeId>, addr: impl Into<String>) -> Self {
        self.config.peers.push(PeerConfig::new(id, addr));
        self
    }

    /// Replace the peer list
    pub fn peers(mut self, peers: Vec<PeerConfig>) -> Self {
        self.config.peers = peers;
        self
    }

    pub fn replication_factor(mut self, n: usize) -> Self {
        self.config.replication_factor = n;
        self
    }

    pub fn read_quorum(mut self, r: usize) -> Self {
        self.config.read_quorum = Some(r);
        self
    }

    pub fn write_quorum(mut self, w: usize) -> Self {
        self.config.write_quorum = Some(w);
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn virtual_nodes(mut self, count: usize) -> Self {
        self.config.virtual_nodes = count;
        self
    }

    /// Set the failure detector period (0 disables it)
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    pub fn suspect_after_misses(mut self, misses: u32) -> Self {
        self.config.suspect_after_misses = misses;
        self
    }

    pub fn dead_after_ms(mut self, ms: u64) -> Self {
        self.config.dead_after_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
