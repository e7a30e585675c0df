//! Cluster test suite
//!
//! Runs several engines in one process. Every node is reached through a
//! `TestPeer`, which can be taken down, slowed down, or asked to coordinate
//! a forwarded request, so failures are injected without sockets.

mod membership_tests;
mod ring_tests;
mod router_tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use shardkv::cluster::{
    ClientReply, ClientRequest, Consistency, Coordinator, Member, Membership, OwnerRegistry,
    ReplicaDispatcher, ReplicaOwner, ReplicaRequest, ReplicaResponse, Ring, Router,
};
use shardkv::config::Config;
use shardkv::{Engine, NodeId, Result, ShardError};
use tempfile::TempDir;

// =============================================================================
// Test Replica
// =============================================================================

pub struct TestPeer {
    id: NodeId,
    engine: Arc<Engine>,
    down: AtomicBool,
    delay_ms: AtomicU64,
    router: OnceLock<Arc<Router>>,
}

impl TestPeer {
    pub fn new(id: NodeId, engine: Arc<Engine>) -> Self {
        Self {
            id,
            engine,
            down: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            router: OnceLock::new(),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(ShardError::Network(format!("{} is down", self.id)));
        }
        Ok(())
    }
}

impl ReplicaOwner for TestPeer {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn apply(&self, request: ReplicaRequest) -> Result<ReplicaResponse> {
        self.check()?;
        match request {
            ReplicaRequest::Write(record) => self.engine.apply(record).map(ReplicaResponse::Applied),
            ReplicaRequest::Read { key } => self.engine.get(&key).map(ReplicaResponse::Found),
        }
    }

    fn forward(&self, request: ClientRequest) -> Result<ClientReply> {
        self.check()?;
        let router = self
            .router
            .get()
            .ok_or_else(|| ShardError::Network("no router".into()))?;
        router.handle(request, true)
    }

    fn ping(&self) -> Result<()> {
        self.check()
    }
}

// =============================================================================
// Test Cluster
// =============================================================================

pub struct TestCluster {
    pub ids: Vec<NodeId>,
    pub engines: Vec<Arc<Engine>>,
    pub peers: Vec<Arc<TestPeer>>,
    pub ring: Arc<Ring>,
    pub membership: Arc<Membership>,
    pub owners: Arc<OwnerRegistry>,
    pub routers: Vec<Arc<Router>>,
    consistency: Consistency,
    timeout: Duration,
    _dirs: Vec<TempDir>,
}

impl TestCluster {
    pub fn new(nodes: usize, consistency: Consistency, timeout: Duration) -> Self {
        let ids: Vec<NodeId> = (0..nodes).map(|i| NodeId::from(format!("node-{}", i))).collect();
        let mut dirs = Vec::new();
        let mut engines = Vec::new();
        for _ in 0..nodes {
            let dir = TempDir::new().unwrap();
            let config = Config::builder().data_dir(dir.path()).build();
            engines.push(Arc::new(Engine::open(config).unwrap()));
            dirs.push(dir);
        }

        let ring = Arc::new(Ring::with_nodes(64, &ids));
        let membership = Arc::new(Membership::new(
            ids.iter().map(|id| Member::alive(id.clone(), "in-process")),
        ));
        let owners = Arc::new(OwnerRegistry::new());
        let peers: Vec<Arc<TestPeer>> = ids
            .iter()
            .zip(&engines)
            .map(|(id, engine)| Arc::new(TestPeer::new(id.clone(), Arc::clone(engine))))
            .collect();
        for peer in &peers {
            owners.register(Arc::clone(peer) as Arc<dyn ReplicaOwner>);
        }

        let routers: Vec<Arc<Router>> = ids
            .iter()
            .zip(&engines)
            .map(|(id, engine)| {
                let coordinator = Coordinator::new(
                    id.clone(),
                    Arc::clone(engine.clock()),
                    Arc::clone(&ring),
                    Arc::clone(&membership),
                    Arc::clone(&owners),
                    consistency,
                    timeout,
                );
                Arc::new(Router::new(Arc::new(coordinator)))
            })
            .collect();
        for (peer, router) in peers.iter().zip(&routers) {
            let _ = peer.router.set(Arc::clone(router));
        }

        Self {
            ids,
            engines,
            peers,
            ring,
            membership,
            owners,
            routers,
            consistency,
            timeout,
            _dirs: dirs,
        }
    }

    pub fn coordinator(&self, node: usize) -> &Arc<Coordinator> {
        self.routers[node].coordinator()
    }

    /// A standalone coordinator for `node` running replica calls on `dispatcher`
    pub fn coordinator_with(&self, node: usize, dispatcher: ReplicaDispatcher) -> Coordinator {
        Coordinator::new(
            self.ids[node].clone(),
            Arc::clone(self.engines[node].clock()),
            Arc::clone(&self.ring),
            Arc::clone(&self.membership),
            Arc::clone(&self.owners),
            self.consistency,
            self.timeout,
        )
        .with_dispatcher(dispatcher)
    }

    pub fn kill(&self, node: usize) {
        self.peers[node].set_down(true);
    }

    pub fn revive(&self, node: usize) {
        self.peers[node].set_down(false);
    }

    /// Local value on one node, bypassing the coordinator
    pub fn local_value(&self, node: usize, key: &[u8]) -> Option<Vec<u8>> {
        self.engines[node].get_value(key).unwrap()
    }

    /// Index of the node with this id
    pub fn index_of(&self, id: &NodeId) -> usize {
        self.ids.iter().position(|i| i == id).unwrap()
    }
}

pub fn level(n: usize, r: usize, w: usize) -> Consistency {
    Consistency::new(n, r, w).unwrap()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
