//! Consistent hashing ring
//!
//! Each node sits at `virtual_nodes` positions on a 64-bit ring. A key's
//! owners are the distinct live nodes met walking clockwise from the key's
//! hash, so adding or removing one node only moves the keys next to its
//! positions.

use std::collections::{BTreeMap, BTreeSet};

use crate::record::NodeId;

use super::MembershipSnapshot;

pub struct Ring {
    positions: BTreeMap<u64, NodeId>,
    nodes: BTreeSet<NodeId>,
    virtual_nodes: usize,
}

impl Ring {
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            positions: BTreeMap::new(),
            nodes: BTreeSet::new(),
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    /// Ring holding every node in `nodes`
    pub fn with_nodes<'a>(virtual_nodes: usize, nodes: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let mut ring = Self::new(virtual_nodes);
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    pub fn add_node(&mut self, node: &NodeId) {
        for i in 0..self.virtual_nodes {
            let position = hash_bytes(format!("{}#{}", node, i).as_bytes());
            self.positions.insert(position, node.clone());
        }
        self.nodes.insert(node.clone());
    }

    pub fn remove_node(&mut self, node: &NodeId) {
        self.positions.retain(|_, owner| owner != node);
        self.nodes.remove(node);
    }

    /// Number of distinct nodes on the ring
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Up to `count` distinct live owners of `key`, in ring order
    ///
    /// DEAD nodes and nodes unknown to `membership` are skipped and the walk
    /// continues clockwise. Fewer than `count` come back only when fewer live
    /// nodes exist.
    pub fn owners(&self, key: &[u8], count: usize, membership: &MembershipSnapshot) -> Vec<NodeId> {
        let count = count.min(self.nodes.len());
        let mut owners: Vec<NodeId> = Vec::with_capacity(count);
        if count == 0 {
            return owners;
        }

        let start = hash_bytes(key);
        let clockwise = self
            .positions
            .range(start..)
            .chain(self.positions.range(..start));

        for (_, node) in clockwise {
            if owners.contains(node) || !membership.is_live(node) {
                continue;
            }
            owners.push(node.clone());
            if owners.len() == count {
                break;
            }
        }
        owners
    }
}

/// FNV-1a, 64 bit
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
