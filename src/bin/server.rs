//! shardkv Server Binary
//!
//! Starts one cluster node and serves it over TCP.

use std::sync::Arc;

use clap::Parser;
use shardkv::network::Server;
use shardkv::{Config, Node, PeerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// shardkv node
#[derive(Parser, Debug)]
#[command(name = "shardkv-server")]
#[command(about = "Replicated, partitioned key-value store node")]
#[command(version)]
struct Args {
    /// Identifier of this node, unique in the cluster
    #[arg(short, long, default_value = "node-1")]
    node_id: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7400")]
    listen: String,

    /// Another cluster member as id=host:port (repeatable)
    #[arg(short, long = "peer", value_parser = parse_peer)]
    peers: Vec<PeerConfig>,

    /// Data directory
    #[arg(short, long, default_value = "./shardkv_data")]
    data_dir: String,

    /// Replicas per key (N)
    #[arg(long, default_value = "3")]
    replication_factor: usize,

    /// Default read quorum (R); majority of N if unset
    #[arg(long)]
    read_quorum: Option<usize>,

    /// Default write quorum (W); majority of N if unset
    #[arg(long)]
    write_quorum: Option<usize>,

    /// Deadline of one coordinated operation in milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "64")]
    memtable_mb: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Heartbeat period in milliseconds (0 disables failure detection)
    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,
}

fn parse_peer(s: &str) -> Result<PeerConfig, String> {
    PeerConfig::parse(s).map_err(|e| e.to_string())
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("shardkv server v{}", shardkv::VERSION);
    tracing::info!("Node id: {}", args.node_id);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let mut builder = Config::builder()
        .node_id(args.node_id.as_str())
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .peers(args.peers)
        .replication_factor(args.replication_factor)
        .request_timeout_ms(args.timeout_ms)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .heartbeat_interval_ms(args.heartbeat_ms);
    if let Some(r) = args.read_quorum {
        builder = builder.read_quorum(r);
    }
    if let Some(w) = args.write_quorum {
        builder = builder.write_quorum(w);
    }
    let config = builder.build();

    let server = match Server::bind(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    let node = match Node::open(config) {
        Ok(n) => Arc::new(n),
        Err(e) => {
            tracing::error!("Failed to open node: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.start_background() {
        tracing::error!("Failed to start background tasks: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Node initialized successfully");

    if let Err(e) = server.run(Arc::clone(&node)) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = node.shutdown() {
        tracing::error!("Shutdown failed: {}", e);
    }
    tracing::info!("Server stopped");
}
