//! Tests for Router
//!
//! These tests verify:
//! - Owners coordinate locally
//! - Non-owners forward to the first live owner
//! - Forwarded requests are never forwarded again
//! - A failed forward is reported, not retried elsewhere
//! - Replication factors larger than the cluster are refused

use std::time::Duration;

use shardkv::cluster::{ClientReply, ClientRequest, Consistency};
use shardkv::ShardError;

use super::{level, TestCluster};

const TIMEOUT: Duration = Duration::from_millis(500);

/// Find a key whose single owner is `owner`
fn key_owned_by(cluster: &TestCluster, owner: usize) -> Vec<u8> {
    let snapshot = cluster.membership.snapshot();
    (0..10_000)
        .map(|i| format!("key-{}", i).into_bytes())
        .find(|key| cluster.ring.owners(key, 1, &snapshot)[0] == cluster.ids[owner])
        .unwrap()
}

#[test]
fn test_owner_coordinates_locally() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);
    let key = key_owned_by(&cluster, 0);

    let reply = cluster.routers[0]
        .handle(ClientRequest::put(key.clone(), "v"), false)
        .unwrap();
    assert_eq!(reply, ClientReply::Done);

    assert_eq!(cluster.local_value(0, &key), Some(b"v".to_vec()));
    assert_eq!(cluster.local_value(1, &key), None);
    assert_eq!(cluster.local_value(2, &key), None);
}

#[test]
fn test_non_owner_forwards() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);
    let key = key_owned_by(&cluster, 2);

    cluster.routers[0]
        .handle(ClientRequest::put(key.clone(), "v"), false)
        .unwrap();

    assert_eq!(cluster.local_value(2, &key), Some(b"v".to_vec()));
    assert_eq!(cluster.local_value(0, &key), None);

    // The version was stamped by the owner that coordinated it
    let record = cluster.engines[2].get(&key).unwrap().unwrap();
    assert_eq!(record.version.origin, cluster.ids[2]);

    let reply = cluster.routers[1]
        .handle(ClientRequest::get(key.clone()), false)
        .unwrap();
    assert_eq!(reply, ClientReply::Value(Some(b"v".to_vec())));
}

#[test]
fn test_forwarded_request_is_coordinated_in_place() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);
    let key = key_owned_by(&cluster, 2);

    // node-0 does not own the key but was told to coordinate it
    cluster.routers[0]
        .handle(ClientRequest::put(key.clone(), "v"), true)
        .unwrap();

    let record = cluster.engines[2].get(&key).unwrap().unwrap();
    assert_eq!(record.version.origin, cluster.ids[0]);
}

#[test]
fn test_forward_failure_is_not_retried() {
    let cluster = TestCluster::new(3, level(2, 1, 1), TIMEOUT);
    let snapshot = cluster.membership.snapshot();
    let key = (0..10_000)
        .map(|i| format!("key-{}", i).into_bytes())
        .find(|key| !cluster.ring.owners(key, 2, &snapshot).contains(&cluster.ids[0]))
        .unwrap();
    let first_owner = cluster.index_of(&cluster.ring.owners(&key, 2, &snapshot)[0]);

    cluster.kill(first_owner);
    let err = cluster.routers[0]
        .handle(ClientRequest::put(key.clone(), "v"), false)
        .unwrap_err();
    assert!(matches!(err, ShardError::Network(_)));

    // The second owner was never asked
    for node in 0..3 {
        assert_eq!(cluster.local_value(node, &key), None);
    }
}

#[test]
fn test_no_live_owner() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);
    for node in 0..3 {
        cluster.membership.mark_suspect(&cluster.ids[node]).unwrap();
        cluster.membership.mark_dead(&cluster.ids[node]).unwrap();
    }

    let err = cluster.routers[0]
        .handle(ClientRequest::get("k"), false)
        .unwrap_err();
    assert!(err.is_quorum_error());
}

#[test]
fn test_per_request_consistency_override() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);

    cluster.routers[1]
        .handle(
            ClientRequest::put("wide", "v").with_consistency(level(3, 3, 3)),
            false,
        )
        .unwrap();

    for node in 0..3 {
        assert_eq!(cluster.local_value(node, b"wide"), Some(b"v".to_vec()));
    }
}

#[test]
fn test_replication_beyond_cluster_size_is_rejected() {
    let cluster = TestCluster::new(3, level(1, 1, 1), TIMEOUT);
    let oversized = [
        Consistency { n: 4, r: 1, w: 1 },
        Consistency { n: 1 << 40, r: 1, w: 1 },
        Consistency { n: usize::MAX, r: 1, w: 1 },
    ];

    for consistency in oversized {
        let err = cluster.routers[0]
            .handle(ClientRequest::get("k").with_consistency(consistency), false)
            .unwrap_err();
        assert!(matches!(err, ShardError::InvalidConsistency(_)), "{}", err);

        let err = cluster.routers[0]
            .handle(ClientRequest::put("k", "v").with_consistency(consistency), true)
            .unwrap_err();
        assert!(matches!(err, ShardError::InvalidConsistency(_)), "{}", err);
    }

    // N equal to the cluster size is still fine
    cluster.routers[0]
        .handle(ClientRequest::put("k", "v").with_consistency(level(3, 1, 1)), false)
        .unwrap();
}
