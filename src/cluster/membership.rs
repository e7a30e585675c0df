//! Cluster membership
//!
//! The view of which nodes exist and whether they are reachable. Readers take
//! a point-in-time snapshot (an `Arc`) and keep using it for the whole request;
//! writers build a new snapshot and swap it in, so no lock is held across a
//! request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::record::NodeId;

/// Liveness state of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Alive,
    /// Missed heartbeats; still routable
    Suspect,
    /// Skipped by the partitioner
    Dead,
}

impl NodeStatus {
    /// True if the node may own keys
    pub fn is_live(self) -> bool {
        !matches!(self, NodeStatus::Dead)
    }

    /// ALIVE → SUSPECT → DEAD → ALIVE, nothing else
    pub fn can_become(self, to: NodeStatus) -> bool {
        matches!(
            (self, to),
            (NodeStatus::Alive, NodeStatus::Suspect)
                | (NodeStatus::Suspect, NodeStatus::Dead)
                | (NodeStatus::Dead, NodeStatus::Alive)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Alive => "ALIVE",
            NodeStatus::Suspect => "SUSPECT",
            NodeStatus::Dead => "DEAD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: NodeId,
    pub addr: String,
    pub status: NodeStatus,
}

impl Member {
    pub fn alive(id: impl Into<NodeId>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
            status: NodeStatus::Alive,
        }
    }
}

/// Immutable view of the membership at one version
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    version: u64,
    members: BTreeMap<NodeId, Member>,
}

impl MembershipSnapshot {
    /// Bumped on every status change
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &NodeId) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn status(&self, id: &NodeId) -> Option<NodeStatus> {
        self.members.get(id).map(|m| m.status)
    }

    /// Known and not DEAD
    pub fn is_live(&self, id: &NodeId) -> bool {
        self.status(id).map_or(false, NodeStatus::is_live)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn live_count(&self) -> usize {
        self.members.values().filter(|m| m.status.is_live()).count()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Process-wide membership, safe under concurrent updates
pub struct Membership {
    current: RwLock<Arc<MembershipSnapshot>>,
}

impl Membership {
    /// Start with `members` at version 0
    pub fn new(members: impl IntoIterator<Item = Member>) -> Self {
        let members = members.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self {
            current: RwLock::new(Arc::new(MembershipSnapshot {
                version: 0,
                members,
            })),
        }
    }

    /// This node plus every configured peer, all ALIVE
    pub fn from_config(config: &Config) -> Self {
        let local = Member::alive(config.node_id.clone(), config.listen_addr.clone());
        let peers = config
            .peers
            .iter()
            .map(|p| Member::alive(p.id.clone(), p.addr.clone()));
        Self::new(std::iter::once(local).chain(peers))
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn mark_suspect(&self, id: &NodeId) -> Result<bool> {
        self.transition(id, NodeStatus::Suspect)
    }

    pub fn mark_dead(&self, id: &NodeId) -> Result<bool> {
        self.transition(id, NodeStatus::Dead)
    }

    pub fn mark_alive(&self, id: &NodeId) -> Result<bool> {
        self.transition(id, NodeStatus::Alive)
    }

    /// Move `id` to `to`
    ///
    /// Returns false if the node already is in `to`.
    fn transition(&self, id: &NodeId, to: NodeStatus) -> Result<bool> {
        let mut current = self.current.write();
        let from = current
            .status(id)
            .ok_or_else(|| ShardError::UnknownNode(id.clone()))?;

        if from == to {
            return Ok(false);
        }
        if !from.can_become(to) {
            return Err(ShardError::InvalidTransition {
                node: id.clone(),
                from,
                to,
            });
        }

        let mut next = MembershipSnapshot::clone(&current);
        next.version += 1;
        if let Some(member) = next.members.get_mut(id) {
            member.status = to;
        }
        tracing::info!(
            "Node {} is now {} (was {}, membership version {})",
            id,
            to,
            from,
            next.version
        );
        *current = Arc::new(next);
        Ok(true)
    }
}
