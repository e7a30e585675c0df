//! Cluster Module
//!
//! Everything that spans more than one node.
//!
//! ## Components
//! - `membership`: ALIVE / SUSPECT / DEAD view with snapshot reads
//! - `ring`: consistent hashing, key → ordered live owners
//! - `consistency`: `{N, R, W}` levels
//! - `owner`: one interface over local and remote replicas
//! - `coordinator`: quorum fan-out, conflict resolution, read repair
//! - `dispatch`: bounded per-node worker pools for replica calls
//! - `router`: coordinate locally or forward to an owner
//! - `detector`: optional heartbeat-driven membership updates
//!
//! ## Request Flow
//! ```text
//! client → Router ──(not an owner)──→ forward to first live owner
//!            │
//!            └──(owner)──→ Coordinator → Ring.owners(key, N)
//!                               │
//!                  ┌────────────┼────────────┐
//!                  ▼            ▼            ▼
//!             LocalOwner   RemoteOwner  RemoteOwner
//!              (Engine)      (TCP)        (TCP)
//! ```

mod consistency;
mod coordinator;
mod dispatch;
mod detector;
mod membership;
mod owner;
mod ring;
mod router;

pub use consistency::Consistency;
pub use coordinator::{Coordinator, Outcome, ReplicaState, Tally};
pub use detector::FailureDetector;
pub use dispatch::{ReplicaDispatcher, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_DEPTH};
pub use membership::{Member, Membership, MembershipSnapshot, NodeStatus};
pub use owner::{LocalOwner, OwnerRegistry, RemoteOwner, ReplicaOwner, ReplicaRequest, ReplicaResponse};
pub use ring::{hash_bytes, Ring};
pub use router::{ClientOp, ClientReply, ClientRequest, Router};
