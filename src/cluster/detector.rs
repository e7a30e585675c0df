//! Heartbeat failure detector
//!
//! Pings every other member each interval and drives membership:
//! - `suspect_after_misses` consecutive misses: ALIVE → SUSPECT
//! - still missing `dead_after` after becoming SUSPECT: SUSPECT → DEAD
//! - any answer from a DEAD node: DEAD → ALIVE
//!
//! A SUSPECT node that answers again stays SUSPECT (it is still routable);
//! its dead timer restarts from the next miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};

use crate::error::Result;
use crate::record::NodeId;

use super::{Membership, NodeStatus, OwnerRegistry};

#[derive(Debug, Default, Clone)]
struct PeerHealth {
    misses: u32,
    suspect_since: Option<Instant>,
}

pub struct FailureDetector {
    local: NodeId,
    membership: Arc<Membership>,
    owners: Arc<OwnerRegistry>,
    suspect_after_misses: u32,
    dead_after: Duration,
    health: HashMap<NodeId, PeerHealth>,
}

impl FailureDetector {
    pub fn new(
        local: NodeId,
        membership: Arc<Membership>,
        owners: Arc<OwnerRegistry>,
        suspect_after_misses: u32,
        dead_after: Duration,
    ) -> Self {
        Self {
            local,
            membership,
            owners,
            suspect_after_misses: suspect_after_misses.max(1),
            dead_after,
            health: HashMap::new(),
        }
    }

    /// One round of pings
    pub fn tick(&mut self) -> Result<()> {
        let snapshot = self.membership.snapshot();
        for member in snapshot.members() {
            if member.id == self.local {
                continue;
            }
            let reachable = match self.owners.get(&member.id) {
                Some(owner) => owner.ping().is_ok(),
                None => false,
            };
            self.observe(&member.id, member.status, reachable)?;
        }
        Ok(())
    }

    fn observe(&mut self, id: &NodeId, status: NodeStatus, reachable: bool) -> Result<()> {
        let health = self.health.entry(id.clone()).or_default();

        if reachable {
            health.misses = 0;
            health.suspect_since = None;
            if status == NodeStatus::Dead {
                self.membership.mark_alive(id)?;
            }
            return Ok(());
        }

        health.misses = health.misses.saturating_add(1);
        match status {
            NodeStatus::Alive if health.misses >= self.suspect_after_misses => {
                health.suspect_since = Some(Instant::now());
                self.membership.mark_suspect(id)?;
            }
            NodeStatus::Suspect => {
                let since = *health.suspect_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.dead_after {
                    self.membership.mark_dead(id)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Run `tick` every `interval` on a background thread
    ///
    /// The thread exits once `stop` is disconnected.
    pub fn spawn(mut self, interval: Duration, stop: Receiver<()>) -> Result<JoinHandle<()>> {
        let ticker = channel::tick(interval);
        let handle = thread::Builder::new()
            .name("failure-detector".to_string())
            .spawn(move || loop {
                crossbeam::select! {
                    recv(ticker) -> _ => {
                        if let Err(e) = self.tick() {
                            tracing::warn!("Failure detector round failed: {}", e);
                        }
                    }
                    recv(stop) -> _ => break,
                }
            })?;
        Ok(handle)
    }
}
