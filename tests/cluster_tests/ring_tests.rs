//! Tests for Ring
//!
//! These tests verify:
//! - Owner lists are deterministic and duplicate-free
//! - DEAD members are skipped, SUSPECT members are kept
//! - Removing a node only moves the keys it owned

use shardkv::cluster::{hash_bytes, Member, Membership, Ring};
use shardkv::NodeId;

fn ids(n: usize) -> Vec<NodeId> {
    (0..n).map(|i| NodeId::from(format!("node-{}", i))).collect()
}

fn all_alive(ids: &[NodeId]) -> Membership {
    Membership::new(ids.iter().map(|id| Member::alive(id.clone(), "addr")))
}

#[test]
fn test_hash_is_fnv1a() {
    assert_eq!(hash_bytes(b""), 0xcbf2_9ce4_8422_2325);
    assert_eq!(hash_bytes(b"a"), 0xaf63_dc4c_8601_ec8c);
}

#[test]
fn test_owners_are_deterministic() {
    let nodes = ids(5);
    let a = Ring::with_nodes(32, &nodes);
    let b = Ring::with_nodes(32, nodes.iter().rev());
    let membership = all_alive(&nodes);
    let snapshot = membership.snapshot();

    for i in 0..200 {
        let key = format!("key-{}", i);
        assert_eq!(
            a.owners(key.as_bytes(), 3, &snapshot),
            b.owners(key.as_bytes(), 3, &snapshot)
        );
    }
}

#[test]
fn test_owners_distinct_and_bounded() {
    let nodes = ids(3);
    let ring = Ring::with_nodes(16, &nodes);
    let snapshot = all_alive(&nodes).snapshot();

    let owners = ring.owners(b"some-key", 3, &snapshot);
    assert_eq!(owners.len(), 3);
    let mut sorted = owners.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 3);

    // Asking for more than exist returns everyone once
    assert_eq!(ring.owners(b"some-key", 10, &snapshot).len(), 3);
    assert!(ring.owners(b"some-key", 0, &snapshot).is_empty());
    assert_eq!(ring.node_count(), 3);
}

#[test]
fn test_every_node_owns_something() {
    let nodes = ids(3);
    let ring = Ring::with_nodes(64, &nodes);
    let snapshot = all_alive(&nodes).snapshot();

    let mut primaries = std::collections::HashSet::new();
    for i in 0..1000 {
        let owners = ring.owners(format!("user:{}", i).as_bytes(), 1, &snapshot);
        primaries.insert(owners[0].clone());
    }
    assert_eq!(primaries.len(), 3);
}

#[test]
fn test_dead_nodes_skipped() {
    let nodes = ids(4);
    let ring = Ring::with_nodes(16, &nodes);
    let membership = all_alive(&nodes);

    let before = ring.owners(b"k", 2, &membership.snapshot());
    let victim = before[0].clone();

    membership.mark_suspect(&victim).unwrap();
    assert_eq!(ring.owners(b"k", 2, &membership.snapshot()), before);

    membership.mark_dead(&victim).unwrap();
    let after = ring.owners(b"k", 2, &membership.snapshot());
    assert_eq!(after.len(), 2);
    assert!(!after.contains(&victim));
    // The surviving owner keeps its place in ring order
    assert_eq!(after[0], before[1]);
}

#[test]
fn test_unknown_nodes_skipped() {
    let nodes = ids(3);
    let ring = Ring::with_nodes(16, &nodes);
    let membership = Membership::new(vec![Member::alive(nodes[0].clone(), "addr")]);

    assert_eq!(ring.owners(b"k", 3, &membership.snapshot()), vec![nodes[0].clone()]);
}

#[test]
fn test_remove_node_moves_only_its_keys() {
    let nodes = ids(4);
    let full = Ring::with_nodes(32, &nodes);
    let mut reduced = Ring::with_nodes(32, &nodes);
    reduced.remove_node(&nodes[2]);
    assert_eq!(reduced.node_count(), 3);

    let snapshot = all_alive(&nodes).snapshot();
    for i in 0..500 {
        let key = format!("k{}", i);
        let before = full.owners(key.as_bytes(), 1, &snapshot);
        if before[0] != nodes[2] {
            assert_eq!(reduced.owners(key.as_bytes(), 1, &snapshot), before);
        }
    }

    let mut empty = Ring::new(8);
    assert!(empty.is_empty());
    empty.add_node(&nodes[0]);
    assert!(!empty.is_empty());
}

#[test]
fn test_huge_owner_count_is_bounded_by_nodes() {
    let nodes = ids(3);
    let mut ring = Ring::with_nodes(16, &nodes);
    let membership = all_alive(&nodes);
    let snapshot = membership.snapshot();

    assert_eq!(ring.owners(b"k", usize::MAX, &snapshot).len(), 3);
    assert_eq!(ring.owners(b"k", 1 << 40, &snapshot).len(), 3);

    assert_eq!(ring.node_count(), 3);
    ring.remove_node(&nodes[0]);
    assert_eq!(ring.node_count(), 2);
    assert!(!ring.contains(&nodes[0]));
    assert_eq!(ring.owners(b"k", usize::MAX, &snapshot).len(), 2);
}
