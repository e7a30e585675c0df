//! Replica owners
//!
//! The coordinator talks to every replica through [`ReplicaOwner`], so the
//! fan-out is the same whether the replica is this process (`LocalOwner`) or
//! another node reached over TCP (`RemoteOwner`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{Result, ShardError};
use crate::network::Client;
use crate::protocol::{Command, Response};
use crate::record::{NodeId, Record, Value};

use super::router::{ClientReply, ClientRequest};

/// Idle connections kept per remote owner
const MAX_POOLED_CONNECTIONS: usize = 8;

/// A replica-level operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaRequest {
    /// Install a versioned record (put or tombstone)
    Write(Record),
    /// Return the replica's newest record for a key, tombstones included
    Read { key: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaResponse {
    /// Write acknowledged; false if the replica already held a newer version
    Applied(bool),
    Found(Option<Record>),
}

/// A node that can hold replicas
pub trait ReplicaOwner: Send + Sync {
    fn id(&self) -> &NodeId;

    /// Apply a replica operation; an `Err` counts as this replica failing
    fn apply(&self, request: ReplicaRequest) -> Result<ReplicaResponse>;

    /// Hand a client request to this node to coordinate
    fn forward(&self, request: ClientRequest) -> Result<ClientReply>;

    /// Liveness check
    fn ping(&self) -> Result<()>;
}

/// The local engine as a replica
pub struct LocalOwner {
    id: NodeId,
    engine: Arc<Engine>,
}

impl LocalOwner {
    pub fn new(id: impl Into<NodeId>, engine: Arc<Engine>) -> Self {
        Self {
            id: id.into(),
            engine,
        }
    }
}

impl ReplicaOwner for LocalOwner {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn apply(&self, request: ReplicaRequest) -> Result<ReplicaResponse> {
        match request {
            ReplicaRequest::Write(record) => self.engine.apply(record).map(ReplicaResponse::Applied),
            ReplicaRequest::Read { key } => self.engine.get(&key).map(ReplicaResponse::Found),
        }
    }

    fn forward(&self, _request: ClientRequest) -> Result<ClientReply> {
        // The router coordinates locally whenever this node owns the key
        Err(ShardError::Network(format!(
            "request forwarded to the local node {}",
            self.id
        )))
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// A peer reached over TCP, with a small pool of idle connections
pub struct RemoteOwner {
    id: NodeId,
    addr: String,
    timeout: Duration,
    pool: Mutex<Vec<Client>>,
}

impl RemoteOwner {
    pub fn new(id: impl Into<NodeId>, addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
            timeout,
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// One request/response exchange
    ///
    /// A connection that failed is dropped instead of going back to the pool.
    /// Pooled connections may have been closed by the peer while idle, so an
    /// I/O error on one is followed by a single attempt on a fresh connection.
    /// That is safe for replica commands and pings, which apply at most once
    /// per version. Forwards never touch the pool.
    fn call(&self, command: &Command) -> Result<Response> {
        if matches!(command, Command::Forward(_)) {
            return self.connect()?.call(command);
        }

        let pooled = self.pool.lock().pop();
        if let Some(mut client) = pooled {
            match client.call(command) {
                Ok(response) => {
                    self.release(client);
                    return Ok(response);
                }
                Err(ShardError::Io(e)) => {
                    tracing::debug!("Pooled connection to {} failed: {}", self.id, e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut client = self.connect()?;
        let response = client.call(command)?;
        self.release(client);
        Ok(response)
    }

    fn connect(&self) -> Result<Client> {
        Client::connect(&self.addr, Some(self.timeout))
    }

    fn release(&self, client: Client) {
        let mut pool = self.pool.lock();
        if pool.len() < MAX_POOLED_CONNECTIONS {
            pool.push(client);
        }
    }
}

impl ReplicaOwner for RemoteOwner {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn apply(&self, request: ReplicaRequest) -> Result<ReplicaResponse> {
        match request {
            ReplicaRequest::Write(Record {
                key,
                value,
                version,
            }) => {
                let command = match value {
                    Value::Present(value) => Command::ReplicatePut {
                        key,
                        value,
                        version,
                    },
                    Value::Tombstone => Command::ReplicateDelete { key, version },
                };
                self.call(&command)?.into_applied().map(ReplicaResponse::Applied)
            }
            ReplicaRequest::Read { key } => self
                .call(&Command::ReplicateGet { key })?
                .into_record()
                .map(ReplicaResponse::Found),
        }
    }

    fn forward(&self, request: ClientRequest) -> Result<ClientReply> {
        let op = request.op.clone();
        let response = self.call(&Command::Forward(request))?;
        ClientReply::from_response(&op, response)
    }

    fn ping(&self) -> Result<()> {
        self.call(&Command::Ping)?.into_pong()
    }
}

/// Node id → owner
///
/// Owners may be registered after the coordinator starts; a ring member
/// without an owner counts as a failed replica.
#[derive(Default)]
pub struct OwnerRegistry {
    owners: RwLock<HashMap<NodeId, Arc<dyn ReplicaOwner>>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the owner for its id
    pub fn register(&self, owner: Arc<dyn ReplicaOwner>) {
        let id = owner.id().clone();
        self.owners.write().insert(id, owner);
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<dyn ReplicaOwner>> {
        self.owners.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.owners.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}
