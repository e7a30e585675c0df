//! Node
//!
//! One cluster member: its storage engine, its view of the cluster, and the
//! command dispatch the network layer calls into.
//!
//! ## Dispatch
//! - GET / PUT / DELETE: through the router (coordinate or forward)
//! - FORWARD: coordinated here, never re-routed
//! - REPLICATE_*: straight into the engine
//! - SCAN: this node's own storage
//! - PING: liveness

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::cluster::{
    Coordinator, FailureDetector, LocalOwner, Membership, OwnerRegistry, RemoteOwner,
    ReplicaOwner, Ring, Router,
};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, ShardError};
use crate::protocol::{Command, Response, ScanPage};
use crate::record::{NodeId, Record};
use crate::storage::KeyRange;

/// Upper bound on records per SCAN page
pub const MAX_SCAN_PAGE: u32 = 10_000;

pub struct Node {
    config: Config,
    engine: Arc<Engine>,
    membership: Arc<Membership>,
    owners: Arc<OwnerRegistry>,
    router: Router,
    /// Dropping the sender stops every background thread
    stop: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Open the engine and build the cluster view from `config`
    ///
    /// Peers get a `RemoteOwner`; nothing is contacted until a request needs it.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let engine = Arc::new(Engine::open(config.clone())?);
        let membership = Arc::new(Membership::from_config(&config));

        let ids: Vec<NodeId> = std::iter::once(config.node_id.clone())
            .chain(config.peers.iter().map(|p| p.id.clone()))
            .collect();
        let ring = Arc::new(Ring::with_nodes(config.virtual_nodes, &ids));

        let owners = Arc::new(OwnerRegistry::new());
        owners.register(Arc::new(LocalOwner::new(
            config.node_id.clone(),
            Arc::clone(&engine),
        )));
        for peer in &config.peers {
            owners.register(Arc::new(RemoteOwner::new(
                peer.id.clone(),
                peer.addr.clone(),
                config.request_timeout(),
            )));
        }

        let consistency = config.default_consistency()?;
        if !consistency.is_strong() {
            tracing::warn!(
                "Default consistency {} has R + W <= N: reads may miss acknowledged writes",
                consistency
            );
        }

        let coordinator = Arc::new(Coordinator::new(
            config.node_id.clone(),
            Arc::clone(engine.clock()),
            ring,
            Arc::clone(&membership),
            Arc::clone(&owners),
            consistency,
            config.request_timeout(),
        ));

        tracing::info!(
            "Node {} ready: {} members, consistency {}",
            config.node_id,
            ids.len(),
            consistency
        );

        Ok(Self {
            config,
            engine,
            membership,
            owners,
            router: Router::new(coordinator),
            stop: Mutex::new(Some(channel::bounded(0))),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Replace the owner registered for a node id (tests, custom transports)
    pub fn register_owner(&self, owner: Arc<dyn ReplicaOwner>) {
        self.owners.register(owner);
    }

    /// Start the compactor (periodic and flush-triggered) and, if enabled,
    /// the failure detector
    pub fn start_background(&self) -> Result<()> {
        let stop = match self.stop.lock().as_ref() {
            Some((_, rx)) => rx.clone(),
            None => return Err(ShardError::Config("node is shut down".into())),
        };
        let mut handles = self.background.lock();

        if self.config.compaction_interval_ms > 0 || self.config.compaction_trigger > 0 {
            let engine = Arc::clone(&self.engine);
            let stop = stop.clone();
            let ticker = match self.config.compaction_interval_ms {
                0 => channel::never(),
                ms => channel::tick(Duration::from_millis(ms)),
            };
            let requests = self.engine.compaction_requests();
            handles.push(
                thread::Builder::new()
                    .name("compactor".to_string())
                    .spawn(move || loop {
                        crossbeam::select! {
                            recv(ticker) -> _ => {
                                if let Err(e) = engine.compact() {
                                    tracing::error!("Background compaction failed: {}", e);
                                }
                            }
                            recv(requests) -> _ => {
                                if let Err(e) = engine.maybe_compact() {
                                    tracing::error!("Triggered compaction failed: {}", e);
                                }
                            }
                            recv(stop) -> _ => break,
                        }
                    })?,
            );
        }

        if self.config.heartbeat_interval_ms > 0 && !self.config.peers.is_empty() {
            let detector = FailureDetector::new(
                self.config.node_id.clone(),
                Arc::clone(&self.membership),
                Arc::clone(&self.owners),
                self.config.suspect_after_misses,
                Duration::from_millis(self.config.dead_after_ms),
            );
            handles.push(detector.spawn(
                Duration::from_millis(self.config.heartbeat_interval_ms),
                stop,
            )?);
        }
        Ok(())
    }

    /// Stop background threads and flush the engine
    pub fn shutdown(&self) -> Result<()> {
        // Disconnects every clone of the stop receiver
        self.stop.lock().take();
        for handle in self.background.lock().drain(..) {
            if handle.join().is_err() {
                tracing::warn!("A background thread panicked");
            }
        }
        self.engine.detach_compactor();
        self.engine.flush()
    }

    /// Serve one command
    pub fn execute(&self, command: Command) -> Response {
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => {
                if !e.is_quorum_error() {
                    tracing::warn!("Request failed: {}", e);
                }
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<Response> {
        match command {
            Command::Ping => Ok(Response::pong()),

            Command::ReplicatePut {
                key,
                value,
                version,
            } => {
                let changed = self.engine.apply(Record::put(key, value, version))?;
                Ok(Response::applied(changed))
            }
            Command::ReplicateDelete { key, version } => {
                let changed = self.engine.apply(Record::tombstone(key, version))?;
                Ok(Response::applied(changed))
            }
            Command::ReplicateGet { key } => Response::record(self.engine.get(&key)?.as_ref()),

            Command::Scan {
                start,
                end,
                after,
                limit,
            } => self.scan(start, end, after, limit),

            Command::Forward(request) => {
                Ok(self.router.handle(request, true)?.into_response())
            }

            command => {
                let request = command.into_client_request().ok_or_else(|| {
                    ShardError::Protocol("command is not a client request".into())
                })?;
                Ok(self.router.handle(request, false)?.into_response())
            }
        }
    }

    fn scan(
        &self,
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        after: Option<Vec<u8>>,
        limit: Option<u32>,
    ) -> Result<Response> {
        let limit = limit.unwrap_or(MAX_SCAN_PAGE).clamp(1, MAX_SCAN_PAGE) as usize;
        let mut range = KeyRange::new(start, end);
        if let Some(after) = after {
            range = range.resume_after(after);
        }

        let mut scan = self.engine.scan_limit(range, Some(limit))?;
        let mut entries = Vec::new();
        for record in scan.by_ref() {
            let record = record?;
            if let Some(value) = record.value.into_bytes() {
                entries.push((record.key, value));
            }
        }

        let bookmark = if entries.len() == limit {
            scan.bookmark().map(<[u8]>::to_vec)
        } else {
            None
        };
        Response::scan_page(&ScanPage { entries, bookmark })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        self.router.coordinator()
    }
}
