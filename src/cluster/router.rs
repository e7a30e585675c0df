//! Request router
//!
//! Decides, per client request, whether this node coordinates it or hands it
//! to an owner of the key. A request that was already forwarded is always
//! coordinated where it lands, so forwarding never chains.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};
use crate::protocol::{Response, Status};

use super::{Consistency, Coordinator};

/// Client-level operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientOp {
    Get,
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub key: Vec<u8>,
    pub op: ClientOp,
    /// Overrides the cluster default for this request
    pub consistency: Option<Consistency>,
}

impl ClientRequest {
    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            op: ClientOp::Get,
            consistency: None,
        }
    }

    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            op: ClientOp::Put(value.into()),
            consistency: None,
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            op: ClientOp::Delete,
            consistency: None,
        }
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn op_name(&self) -> &'static str {
        match self.op {
            ClientOp::Get => "GET",
            ClientOp::Put(_) => "PUT",
            ClientOp::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientReply {
    /// Put or delete acknowledged
    Done,
    /// Get result; `None` means NotFound
    Value(Option<Vec<u8>>),
}

impl ClientReply {
    /// Wire form of the reply to `op`
    pub fn into_response(self) -> Response {
        match self {
            ClientReply::Done => Response::ok(None),
            ClientReply::Value(Some(value)) => Response::ok(Some(value)),
            ClientReply::Value(None) => Response::not_found(),
        }
    }

    /// Decode the answer a node sent for `op`
    pub fn from_response(op: &ClientOp, response: Response) -> Result<Self> {
        match (op, response.status) {
            (ClientOp::Get, Status::Ok) => Ok(ClientReply::Value(Some(
                response.payload.unwrap_or_default(),
            ))),
            (ClientOp::Get, Status::NotFound) => Ok(ClientReply::Value(None)),
            (_, Status::Ok) => Ok(ClientReply::Done),
            _ => Err(response.into_error()),
        }
    }
}

pub struct Router {
    coordinator: Arc<Coordinator>,
}

impl Router {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Serve a client request
    ///
    /// `forwarded` is set when another node already routed it here.
    pub fn handle(&self, request: ClientRequest, forwarded: bool) -> Result<ClientReply> {
        if forwarded {
            return self.coordinator.coordinate(&request);
        }

        let consistency = request
            .consistency
            .unwrap_or_else(|| self.coordinator.default_consistency());
        self.coordinator.check(&consistency)?;
        let (_, owners) = self.coordinator.replicas(&request.key, consistency.n);

        if owners.contains(self.coordinator.local_id()) {
            return self.coordinator.coordinate(&request);
        }

        // First live owner in ring order
        let target = owners.first().ok_or(ShardError::NodeUnavailable {
            live: 0,
            required: consistency.n,
        })?;
        let owner = self
            .coordinator
            .owners()
            .get(target)
            .ok_or_else(|| ShardError::UnknownNode(target.clone()))?;

        tracing::debug!(
            "Forwarding {} for {:?} to {}",
            request.op_name(),
            String::from_utf8_lossy(&request.key),
            target
        );
        owner.forward(request)
    }
}
