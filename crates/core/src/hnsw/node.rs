//! Node records as seen by callers of the page store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque host tuple handle stored alongside each node.
///
/// The engine never interprets it; scans return it and the bulk-delete
/// callback receives it. Unlike node ids it survives vacuum renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleId(pub u64);

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum neighbor list length at `layer`: `2M` on layer 0, `M` above.
#[inline]
pub fn layer_capacity(m: usize, layer: usize) -> usize {
    if layer == 0 {
        m * 2
    } else {
        m
    }
}

/// Owned snapshot of one node.
///
/// `neighbors[l]` is the neighbor list at layer `l`, ordered by ascending
/// distance to this node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u32,
    pub tuple: TupleId,
    pub vector: Vec<f32>,
    pub neighbors: Vec<Vec<u32>>,
    pub tombstoned: bool,
}

impl Node {
    /// Highest layer this node exists on.
    pub fn max_layer(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }

    /// Neighbors at `layer`; empty above the node's top layer.
    pub fn neighbors(&self, layer: usize) -> &[u32] {
        self.neighbors
            .get(layer)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
