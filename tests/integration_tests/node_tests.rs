//! Tests for Node command dispatch
//!
//! These tests verify, on a single node without sockets:
//! - Client commands through the router
//! - Replica commands straight into the engine
//! - Paged SCAN with bookmarks
//! - Background compaction and shutdown

use std::time::Duration;

use shardkv::node::MAX_SCAN_PAGE;
use shardkv::protocol::{Command, Status};
use shardkv::{Config, Node, Version};
use tempfile::TempDir;

fn single_node(temp: &TempDir) -> Node {
    let config = Config::builder()
        .data_dir(temp.path())
        .node_id("solo")
        .heartbeat_interval_ms(0)
        .compaction_interval_ms(0)
        .build();
    Node::open(config).unwrap()
}

#[test]
fn test_client_commands() {
    let temp = TempDir::new().unwrap();
    let node = single_node(&temp);

    assert_eq!(node.execute(Command::put("k", "v")).status, Status::Ok);

    let response = node.execute(Command::get("k"));
    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.payload, Some(b"v".to_vec()));

    assert_eq!(node.execute(Command::delete("k")).status, Status::Ok);
    assert_eq!(node.execute(Command::get("k")).status, Status::NotFound);
    assert_eq!(node.execute(Command::get("never")).status, Status::NotFound);

    assert!(node.execute(Command::Ping).into_pong().is_ok());
}

#[test]
fn test_replica_commands() {
    let temp = TempDir::new().unwrap();
    let node = single_node(&temp);

    let put = |ts: u64, value: &str| Command::ReplicatePut {
        key: b"k".to_vec(),
        value: value.as_bytes().to_vec(),
        version: Version::new(ts, "peer"),
    };

    assert!(node.execute(put(20, "new")).into_applied().unwrap());
    assert!(!node.execute(put(10, "old")).into_applied().unwrap());

    let record = node
        .execute(Command::ReplicateGet { key: b"k".to_vec() })
        .into_record()
        .unwrap()
        .unwrap();
    assert_eq!(record.version, Version::new(20, "peer"));

    let deleted = node.execute(Command::ReplicateDelete {
        key: b"k".to_vec(),
        version: Version::new(30, "peer"),
    });
    assert!(deleted.into_applied().unwrap());
    let record = node
        .execute(Command::ReplicateGet { key: b"k".to_vec() })
        .into_record()
        .unwrap()
        .unwrap();
    assert!(record.is_tombstone());
}

#[test]
fn test_invalid_consistency_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let node = single_node(&temp);

    let response = node.execute(Command::Get {
        key: b"k".to_vec(),
        consistency: Some(shardkv::cluster::Consistency { n: 1, r: 2, w: 1 }),
    });
    assert_eq!(response.status, Status::BadRequest);
}

#[test]
fn test_oversized_replication_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let node = single_node(&temp);

    for n in [2, 1 << 40, usize::MAX] {
        let consistency = Some(shardkv::cluster::Consistency { n, r: 1, w: 1 });
        let response = node.execute(Command::Get {
            key: b"k".to_vec(),
            consistency,
        });
        assert_eq!(response.status, Status::BadRequest);

        let response = node.execute(Command::Put {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            consistency,
        });
        assert_eq!(response.status, Status::BadRequest);
    }

    // The node is still serving
    assert_eq!(node.execute(Command::put("k", "v")).status, Status::Ok);
}

#[test]
fn test_scan_pages() {
    let temp = TempDir::new().unwrap();
    let node = single_node(&temp);
    for i in 0..25 {
        node.execute(Command::put(format!("key{:02}", i), "v"));
    }
    node.execute(Command::delete("key05"));
    node.engine().flush().unwrap();
    node.execute(Command::put("key30", "v"));

    let mut keys = Vec::new();
    let mut after = None;
    loop {
        let page = node
            .execute(Command::Scan {
                start: Some(b"key".to_vec()),
                end: None,
                after: after.clone(),
                limit: Some(10),
            })
            .into_scan_page()
            .unwrap();
        keys.extend(page.entries.into_iter().map(|(k, _)| String::from_utf8(k).unwrap()));
        match page.bookmark {
            Some(bookmark) => after = Some(bookmark),
            None => break,
        }
    }

    assert_eq!(keys.len(), 25);
    assert!(!keys.contains(&"key05".to_string()));
    assert_eq!(keys.last().map(String::as_str), Some("key30"));
    assert!(MAX_SCAN_PAGE >= 10);
}

#[test]
fn test_background_compaction_and_shutdown() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .node_id("solo")
        .heartbeat_interval_ms(0)
        .compaction_interval_ms(10)
        .compaction_trigger(0)
        .build();
    let node = Node::open(config).unwrap();

    for i in 0..3 {
        node.execute(Command::put(format!("k{}", i), "v"));
        node.engine().flush().unwrap();
    }
    assert_eq!(node.engine().segment_count(), 3);

    node.start_background().unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while node.engine().segment_count() > 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(node.engine().segment_count(), 1);

    node.execute(Command::put("late", "v"));
    node.shutdown().unwrap();
    assert_eq!(node.engine().memtable_entry_count(), 0);
    assert!(node.start_background().is_err());
}

#[test]
fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .node_id("a")
        .peer("a", "127.0.0.1:1")
        .build();
    assert!(Node::open(config).is_err());
}
