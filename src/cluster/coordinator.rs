//! Replication coordinator
//!
//! Fans an operation out to the owners of a key, waits until the quorum is
//! met, cannot be met any more, or the deadline passes, then answers the
//! caller. Replica calls still in flight at that point are abandoned: their
//! effect, if any, stays applied.
//!
//! Reads return the highest version among the answers gathered and repair
//! stale replicas in the background.
//!
//! Replica calls and repairs run on bounded per-node worker pools
//! (`ReplicaDispatcher`), so a slow peer cannot pile up threads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::clock::Clock;
use crate::error::{Result, ShardError};
use crate::record::{newest, NodeId, Record, Value, Version};

use super::dispatch::{ReplicaDispatcher, DEFAULT_IDLE_TIMEOUT};
use super::owner::{OwnerRegistry, ReplicaOwner, ReplicaRequest, ReplicaResponse};
use super::router::{ClientOp, ClientReply, ClientRequest};
use super::{Consistency, Membership, MembershipSnapshot, Ring};

/// Progress of one replica within an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    Pending,
    Acked,
    Failed,
    TimedOut,
}

/// Terminal state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    PartialFailure,
    Timeout,
}

/// Per-operation bookkeeping
#[derive(Debug, Clone)]
pub struct Tally {
    states: BTreeMap<NodeId, ReplicaState>,
    required: usize,
}

impl Tally {
    pub fn new<'a>(replicas: impl IntoIterator<Item = &'a NodeId>, required: usize) -> Self {
        Self {
            states: replicas
                .into_iter()
                .map(|id| (id.clone(), ReplicaState::Pending))
                .collect(),
            required,
        }
    }

    /// Record a reply; only a PENDING replica changes state
    pub fn settle(&mut self, id: &NodeId, state: ReplicaState) {
        if let Some(current) = self.states.get_mut(id) {
            if *current == ReplicaState::Pending {
                *current = state;
            }
        }
    }

    /// Deadline reached: everything still PENDING becomes TIMED_OUT
    pub fn expire(&mut self) {
        for state in self.states.values_mut() {
            if *state == ReplicaState::Pending {
                *state = ReplicaState::TimedOut;
            }
        }
    }

    pub fn count(&self, state: ReplicaState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn acked(&self) -> usize {
        self.count(ReplicaState::Acked)
    }

    pub fn state(&self, id: &NodeId) -> Option<ReplicaState> {
        self.states.get(id).copied()
    }

    /// Terminal outcome, or `None` while the result is still open
    pub fn outcome(&self) -> Option<Outcome> {
        let acked = self.acked();
        if acked >= self.required {
            return Some(Outcome::Succeeded);
        }
        let pending = self.count(ReplicaState::Pending);
        if acked + pending >= self.required {
            return None;
        }
        if self.count(ReplicaState::TimedOut) > 0 {
            Some(Outcome::Timeout)
        } else {
            Some(Outcome::PartialFailure)
        }
    }

    /// Error for a non-successful outcome
    pub fn error(&self) -> ShardError {
        let acks = self.acked();
        let required = self.required;
        match self.outcome() {
            Some(Outcome::Timeout) => ShardError::Timeout { acks, required },
            _ => ShardError::PartialFailure { acks, required },
        }
    }
}

type Reply = (NodeId, Result<ReplicaResponse>);

/// Read repairs one coordinator runs at once
const REPAIR_WORKERS: usize = 2;

/// Read repairs waiting to run; further ones are skipped
const REPAIR_QUEUE_DEPTH: usize = 64;

pub struct Coordinator {
    local: NodeId,
    clock: Arc<Clock>,
    ring: Arc<Ring>,
    membership: Arc<Membership>,
    owners: Arc<OwnerRegistry>,
    default_consistency: Consistency,
    timeout: Duration,
    dispatcher: ReplicaDispatcher,
    repairs: ReplicaDispatcher,
}

impl Coordinator {
    pub fn new(
        local: NodeId,
        clock: Arc<Clock>,
        ring: Arc<Ring>,
        membership: Arc<Membership>,
        owners: Arc<OwnerRegistry>,
        default_consistency: Consistency,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
            clock,
            ring,
            membership,
            owners,
            default_consistency,
            timeout,
            dispatcher: ReplicaDispatcher::default(),
            repairs: ReplicaDispatcher::new(
                "read-repair",
                REPAIR_WORKERS,
                REPAIR_QUEUE_DEPTH,
                DEFAULT_IDLE_TIMEOUT,
            ),
        }
    }

    /// Replace the worker pools used for replica calls
    pub fn with_dispatcher(mut self, dispatcher: ReplicaDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher(&self) -> &ReplicaDispatcher {
        &self.dispatcher
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn default_consistency(&self) -> Consistency {
        self.default_consistency
    }

    pub fn owners(&self) -> &Arc<OwnerRegistry> {
        &self.owners
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    /// Reject levels this cluster cannot serve
    ///
    /// Besides the `{N, R, W}` bounds, N may not exceed the number of nodes on
    /// the ring. Levels come from clients, so this runs before the ring walk.
    pub fn check(&self, consistency: &Consistency) -> Result<()> {
        consistency.validate()?;
        let nodes = self.ring.node_count();
        if consistency.n > nodes {
            return Err(ShardError::InvalidConsistency(format!(
                "N={} exceeds the {} nodes of the cluster",
                consistency.n, nodes
            )));
        }
        Ok(())
    }

    /// Live owners of `key` under the current membership snapshot
    pub fn replicas(&self, key: &[u8], n: usize) -> (Arc<MembershipSnapshot>, Vec<NodeId>) {
        let snapshot = self.membership.snapshot();
        let owners = self.ring.owners(key, n, &snapshot);
        (snapshot, owners)
    }

    /// Run a client operation against the replicas of its key
    pub fn coordinate(&self, request: &ClientRequest) -> Result<ClientReply> {
        let consistency = request.consistency.unwrap_or(self.default_consistency);
        match &request.op {
            ClientOp::Get => {
                let record = self.read(&request.key, consistency)?;
                Ok(ClientReply::Value(record.and_then(|r| r.value.into_bytes())))
            }
            ClientOp::Put(value) => {
                self.write(&request.key, Value::Present(value.clone()), consistency)?;
                Ok(ClientReply::Done)
            }
            ClientOp::Delete => {
                self.write(&request.key, Value::Tombstone, consistency)?;
                Ok(ClientReply::Done)
            }
        }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Stamp a new version and install it on the owners
    ///
    /// Succeeds once W owners acknowledged. Owners that applied the write
    /// before a failure is reported keep it.
    pub fn write(&self, key: &[u8], value: Value, consistency: Consistency) -> Result<Version> {
        self.check(&consistency)?;
        let version = Version::new(self.clock.tick(), self.local.clone());
        let record = Record {
            key: key.to_vec(),
            value,
            version: version.clone(),
        };

        let (_, replicas) = self.replicas(key, consistency.n);
        if replicas.len() < consistency.w {
            return Err(ShardError::NodeUnavailable {
                live: replicas.len(),
                required: consistency.w,
            });
        }

        let mut tally = Tally::new(&replicas, consistency.w);
        let deadline = Instant::now() + self.timeout;
        let rx = self.fan_out(&replicas, ReplicaRequest::Write(record), &mut tally);
        let (outcome, _) = collect(&rx, &mut tally, deadline);

        tracing::debug!(
            "Write of {:?} at {}: {:?} with {}/{} acks",
            String::from_utf8_lossy(key),
            version.timestamp,
            outcome,
            tally.acked(),
            consistency.w
        );

        match outcome {
            Outcome::Succeeded => Ok(version),
            _ => Err(tally.error()),
        }
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Newest record among R replica answers, tombstones included
    pub fn read(&self, key: &[u8], consistency: Consistency) -> Result<Option<Record>> {
        self.check(&consistency)?;
        let (_, replicas) = self.replicas(key, consistency.n);
        if replicas.len() < consistency.r {
            return Err(ShardError::NodeUnavailable {
                live: replicas.len(),
                required: consistency.r,
            });
        }

        let mut tally = Tally::new(&replicas, consistency.r);
        let deadline = Instant::now() + self.timeout;
        let request = ReplicaRequest::Read { key: key.to_vec() };
        let rx = self.fan_out(&replicas, request, &mut tally);
        let (outcome, replies) = collect(&rx, &mut tally, deadline);

        if outcome != Outcome::Succeeded {
            tracing::debug!(
                "Read of {:?}: {:?} with {}/{} answers",
                String::from_utf8_lossy(key),
                outcome,
                tally.acked(),
                consistency.r
            );
            return Err(tally.error());
        }

        let answers: Vec<(NodeId, Option<Record>)> = replies
            .into_iter()
            .filter_map(|(id, response)| match response {
                ReplicaResponse::Found(record) => Some((id, record)),
                ReplicaResponse::Applied(_) => None,
            })
            .collect();

        let winner = newest(answers.iter().map(|(_, r)| r)).cloned();

        let still_pending: Vec<NodeId> = replicas
            .iter()
            .filter(|id| tally.state(id) == Some(ReplicaState::Pending))
            .cloned()
            .collect();
        if winner.is_some() || !still_pending.is_empty() {
            self.spawn_read_repair(key.to_vec(), answers, rx, still_pending.len(), deadline);
        }

        Ok(winner)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Queue one call per replica; replies arrive on the returned channel
    fn fan_out(
        &self,
        replicas: &[NodeId],
        request: ReplicaRequest,
        tally: &mut Tally,
    ) -> Receiver<Reply> {
        let (tx, rx) = channel::unbounded();

        for id in replicas {
            let owner = match self.owners.get(id) {
                Some(owner) => owner,
                None => {
                    tracing::warn!("No owner registered for node {}", id);
                    tally.settle(id, ReplicaState::Failed);
                    continue;
                }
            };

            let tx = tx.clone();
            let request = request.clone();
            let node = id.clone();
            let queued = self.dispatcher.submit(id, move || {
                let result = owner.apply(request);
                // The coordinator may have stopped listening
                let _ = tx.send((node, result));
            });

            if let Err(e) = queued {
                tracing::warn!("Call to {} not started: {}", id, e);
                tally.settle(id, ReplicaState::Failed);
            }
        }
        rx
    }

    /// Push the winning record to replicas that answered with something older
    ///
    /// Also waits (until `deadline`) for the replicas that had not answered
    /// yet and repairs them too.
    fn spawn_read_repair(
        &self,
        key: Vec<u8>,
        mut answers: Vec<(NodeId, Option<Record>)>,
        rx: Receiver<Reply>,
        mut outstanding: usize,
        deadline: Instant,
    ) {
        let owners = Arc::clone(&self.owners);
        let queued = self.repairs.submit(&self.local, move || {
            while outstanding > 0 {
                match rx.recv_deadline(deadline) {
                    Ok((id, Ok(ReplicaResponse::Found(record)))) => answers.push((id, record)),
                    Ok(_) => {}
                    Err(_) => break,
                }
                outstanding -= 1;
            }
            repair(&owners, &key, &answers);
        });

        if let Err(e) = queued {
            tracing::debug!("Skipping read repair: {}", e);
        }
    }
}

/// Wait for replies until the tally reaches a terminal outcome or the deadline
fn collect(
    rx: &Receiver<Reply>,
    tally: &mut Tally,
    deadline: Instant,
) -> (Outcome, Vec<(NodeId, ReplicaResponse)>) {
    let mut replies = Vec::new();
    loop {
        if let Some(outcome) = tally.outcome() {
            return (outcome, replies);
        }
        match rx.recv_deadline(deadline) {
            Ok((id, Ok(response))) => {
                tally.settle(&id, ReplicaState::Acked);
                replies.push((id, response));
            }
            Ok((id, Err(e))) => {
                tracing::warn!("Replica {} failed: {}", id, e);
                tally.settle(&id, ReplicaState::Failed);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                tally.expire();
                let outcome = tally.outcome().unwrap_or(Outcome::Timeout);
                return (outcome, replies);
            }
        }
    }
}

/// Write the newest answer back to every replica that returned an older one
fn repair(owners: &OwnerRegistry, key: &[u8], answers: &[(NodeId, Option<Record>)]) {
    let winner = match newest(answers.iter().map(|(_, r)| r)) {
        Some(winner) => winner.clone(),
        None => return,
    };

    for (id, answer) in answers {
        let stale = match answer {
            Some(record) => record.version < winner.version,
            None => true,
        };
        if !stale {
            continue;
        }
        let owner = match owners.get(id) {
            Some(owner) => owner,
            None => continue,
        };
        match owner.apply(ReplicaRequest::Write(winner.clone())) {
            Ok(_) => tracing::debug!(
                "Read repair of {:?} on {} to version {}",
                String::from_utf8_lossy(key),
                id,
                winner.version.timestamp
            ),
            Err(e) => tracing::warn!("Read repair on {} failed: {}", id, e),
        }
    }
}
