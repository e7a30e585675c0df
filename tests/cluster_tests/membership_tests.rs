//! Tests for Membership
//!
//! These tests verify:
//! - Allowed transitions: ALIVE→SUSPECT→DEAD→ALIVE
//! - Forbidden transitions are rejected
//! - Snapshots are immutable and versioned

use shardkv::cluster::{Member, Membership, NodeStatus};
use shardkv::config::Config;
use shardkv::{NodeId, ShardError};

fn membership() -> (Membership, NodeId) {
    let id = NodeId::from("b");
    let m = Membership::new(vec![Member::alive("a", "addr-a"), Member::alive(id.clone(), "addr-b")]);
    (m, id)
}

#[test]
fn test_full_cycle() {
    let (m, b) = membership();

    assert!(m.mark_suspect(&b).unwrap());
    assert_eq!(m.snapshot().status(&b), Some(NodeStatus::Suspect));
    assert!(m.snapshot().is_live(&b));

    assert!(m.mark_dead(&b).unwrap());
    assert!(!m.snapshot().is_live(&b));
    assert_eq!(m.snapshot().live_count(), 1);

    assert!(m.mark_alive(&b).unwrap());
    assert_eq!(m.snapshot().status(&b), Some(NodeStatus::Alive));
    assert_eq!(m.snapshot().version(), 3);
}

#[test]
fn test_forbidden_transitions() {
    let (m, b) = membership();

    // ALIVE cannot die without being suspected first
    assert!(matches!(
        m.mark_dead(&b),
        Err(ShardError::InvalidTransition {
            from: NodeStatus::Alive,
            to: NodeStatus::Dead,
            ..
        })
    ));

    m.mark_suspect(&b).unwrap();
    assert!(m.mark_alive(&b).is_err());

    m.mark_dead(&b).unwrap();
    assert!(m.mark_suspect(&b).is_err());
    assert_eq!(m.snapshot().status(&b), Some(NodeStatus::Dead));
}

#[test]
fn test_same_state_is_noop() {
    let (m, b) = membership();
    let version = m.snapshot().version();

    assert!(!m.mark_alive(&b).unwrap());
    assert_eq!(m.snapshot().version(), version);
}

#[test]
fn test_unknown_node() {
    let (m, _) = membership();
    assert!(matches!(
        m.mark_suspect(&NodeId::from("zzz")),
        Err(ShardError::UnknownNode(_))
    ));
}

#[test]
fn test_snapshots_are_isolated() {
    let (m, b) = membership();
    let before = m.snapshot();

    m.mark_suspect(&b).unwrap();

    assert_eq!(before.status(&b), Some(NodeStatus::Alive));
    assert_eq!(m.snapshot().status(&b), Some(NodeStatus::Suspect));
    assert!(m.snapshot().version() > before.version());
}

#[test]
fn test_from_config() {
    let config = Config::builder()
        .node_id("n1")
        .listen_addr("127.0.0.1:7001")
        .peer("n2", "127.0.0.1:7002")
        .peer("n3", "127.0.0.1:7003")
        .build();
    let snapshot = Membership::from_config(&config).snapshot();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.live_count(), 3);
    assert_eq!(
        snapshot.get(&NodeId::from("n3")).unwrap().addr,
        "127.0.0.1:7003"
    );
    assert_eq!(NodeStatus::Suspect.to_string(), "SUSPECT");
}
