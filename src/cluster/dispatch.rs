//! Replica call dispatch
//!
//! Replica calls run on small per-node worker pools instead of a thread per
//! call. Each node gets a lane: a bounded job queue drained by at most
//! `max_workers` threads. Workers start when a job is queued and nobody is
//! free to take it, and exit after sitting idle for `idle_timeout`.
//!
//! A slow or hung peer therefore ties up at most `max_workers` threads and
//! `queue_depth` queued calls. Submissions beyond that are refused so the
//! caller can count the replica as failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;

use crate::error::{Result, ShardError};
use crate::record::NodeId;

/// Worker threads per replica node
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Calls that may wait for a worker, per replica node
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// How long an idle worker waits for work before exiting
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Lane {
    name: String,
    tx: Sender<Job>,
    rx: Receiver<Job>,
    workers: AtomicUsize,
    idle: AtomicUsize,
    max_workers: usize,
    idle_timeout: Duration,
}

impl Lane {
    fn new(name: String, max_workers: usize, queue_depth: usize, idle_timeout: Duration) -> Self {
        let (tx, rx) = channel::bounded(queue_depth.max(1));
        Self {
            name,
            tx,
            rx,
            workers: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            max_workers: max_workers.max(1),
            idle_timeout,
        }
    }

    /// Reserve a worker slot if the lane is below its limit
    fn claim_worker(&self) -> bool {
        self.workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_workers).then_some(n + 1)
            })
            .is_ok()
    }

    fn submit(self: &Arc<Self>, job: Job) -> std::result::Result<(), TrySendError<Job>> {
        self.tx.try_send(job)?;

        // Queued jobs outnumber the workers waiting for them
        if self.rx.len() > self.idle.load(Ordering::SeqCst) && self.claim_worker() {
            let lane = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || lane.run());
            if let Err(e) = spawned {
                self.workers.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("Failed to start worker for {}: {}", self.name, e);
            }
        }
        Ok(())
    }

    fn run(&self) {
        loop {
            self.idle.fetch_add(1, Ordering::SeqCst);
            let job = self.rx.recv_timeout(self.idle_timeout);
            self.idle.fetch_sub(1, Ordering::SeqCst);

            match job {
                Ok(job) => job(),
                Err(RecvTimeoutError::Timeout) => {
                    self.workers.fetch_sub(1, Ordering::SeqCst);
                    // A job queued after the timeout may have counted on this worker
                    if self.rx.is_empty() || !self.claim_worker() {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.workers.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

/// Bounded worker pools for replica calls, one lane per node
pub struct ReplicaDispatcher {
    name: String,
    lanes: RwLock<HashMap<NodeId, Arc<Lane>>>,
    max_workers: usize,
    queue_depth: usize,
    idle_timeout: Duration,
}

impl ReplicaDispatcher {
    /// Workers are named `<name>-<node>`
    pub fn new(name: &str, max_workers: usize, queue_depth: usize, idle_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            lanes: RwLock::new(HashMap::new()),
            max_workers,
            queue_depth,
            idle_timeout,
        }
    }

    /// Queue `job` on the lane of `node`
    ///
    /// Fails with `Overloaded` when the lane's queue is full; the job is then
    /// dropped without running.
    pub fn submit<F>(&self, node: &NodeId, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.lane(node)
            .submit(Box::new(job))
            .map_err(|_| ShardError::Overloaded(node.clone()))
    }

    /// Live worker threads for `node`
    pub fn worker_count(&self, node: &NodeId) -> usize {
        self.lanes
            .read()
            .get(node)
            .map_or(0, |lane| lane.workers.load(Ordering::SeqCst))
    }

    /// Calls for `node` waiting for a worker
    pub fn queued(&self, node: &NodeId) -> usize {
        self.lanes.read().get(node).map_or(0, |lane| lane.rx.len())
    }

    fn lane(&self, node: &NodeId) -> Arc<Lane> {
        if let Some(lane) = self.lanes.read().get(node) {
            return Arc::clone(lane);
        }
        let mut lanes = self.lanes.write();
        let lane = lanes.entry(node.clone()).or_insert_with(|| {
            Arc::new(Lane::new(
                format!("{}-{}", self.name, node),
                self.max_workers,
                self.queue_depth,
                self.idle_timeout,
            ))
        });
        Arc::clone(lane)
    }
}

impl Default for ReplicaDispatcher {
    fn default() -> Self {
        Self::new("replica", DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_DEPTH, DEFAULT_IDLE_TIMEOUT)
    }
}
