//! HNSW insertion: one node at a time, with bidirectional linking.
//!
//! [`insert_node`] is the single construction step shared by the bulk
//! builder and the incremental [`insert`]. Neighbors of the new node are
//! chosen with [`select_neighbors`]; each chosen neighbor gets a back link
//! and is re-pruned when its list would overflow.

use crate::error::{HnswError, Result};
use crate::hnsw::graph::{GraphIndex, LevelGenerator, ResultFilter};
use crate::hnsw::node::TupleId;
use crate::hnsw::select::select_neighbors;
use crate::hnsw::visited::VisitedSet;
use crate::storage::PageStore;

/// Node placed by [`insert_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Linked {
    pub id: u32,
    /// Top layer drawn for the node.
    pub level: usize,
}

/// Check a vector against the index dimension and metric.
pub(crate) fn check_input(store: &PageStore, vector: &[f32]) -> Result<()> {
    let config = store.config();
    if vector.len() != config.dimensions {
        return Err(HnswError::DimensionMismatch {
            expected: config.dimensions,
            actual: vector.len(),
        });
    }
    config.metric.check_vector(vector)
}

/// Place one validated vector in the graph.
///
/// `entry` is the current entry point and global max layer. The caller owns
/// entry-point bookkeeping: the new node should become the entry point when
/// its `level` exceeds the old max layer. Inserts must be serialized.
pub(crate) fn insert_node(
    graph: GraphIndex<'_>,
    levels: &mut LevelGenerator,
    entry: Option<(u32, usize)>,
    tuple: TupleId,
    vector: &[f32],
    visited: &mut VisitedSet,
) -> Result<Linked> {
    let store = graph.store();
    let config = graph.config();
    let level = levels.next_level();

    let (entry_point, max_layer) = match entry {
        Some(e) => e,
        None => {
            let id = store.append_node(tuple, vector, vec![Vec::new(); level + 1])?;
            return Ok(Linked { id, level });
        }
    };

    // Phase 1: greedy descent through the layers above the node's own.
    let mut current = entry_point;
    if level < max_layer {
        current = graph.greedy_descend(vector, entry_point, max_layer, level + 1, visited)?;
    }

    // Phase 2: pick neighbors on every layer the node shares with the graph.
    // Tombstones stay eligible; vacuum relinks around them.
    let top = level.min(max_layer);
    let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
    let mut layer_eps = vec![current];
    for layer in (0..=top).rev() {
        let found = graph.search_layer(
            vector,
            &layer_eps,
            config.ef_construction,
            layer,
            visited,
            ResultFilter::All,
        )?;
        let selected = select_neighbors(
            &found,
            config.capacity(layer),
            config.heuristic,
            None,
            |a, b| graph.distance_between(a, b),
        )?;
        neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

        if !found.is_empty() {
            layer_eps.clear();
            layer_eps.extend(found.iter().map(|&(_, id)| id));
        }
    }

    let id = store.append_node(tuple, vector, neighbors.clone())?;

    // Phase 3: back links, re-pruning overflowing lists.
    for (layer, chosen) in neighbors.iter().enumerate().take(top + 1) {
        for &neighbor in chosen {
            link_back(graph, neighbor, id, layer)?;
        }
    }

    tracing::trace!("Linked node {} at level {}", id, level);
    Ok(Linked { id, level })
}

/// Add `new_id` to `owner`'s list at `layer`, keeping it ordered by distance.
fn link_back(graph: GraphIndex<'_>, owner: u32, new_id: u32, layer: usize) -> Result<()> {
    let config = graph.config();
    let current = graph.store().slot(owner)?.neighbors(layer);
    if current.contains(&new_id) {
        return Ok(());
    }

    let mut candidates = Vec::with_capacity(current.len() + 1);
    for &n in current.iter() {
        candidates.push((graph.distance_between(owner, n)?, n));
    }
    candidates.push((graph.distance_between(owner, new_id)?, new_id));

    let capacity = config.capacity(layer);
    let list: Vec<u32> = if candidates.len() <= capacity {
        candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.iter().map(|&(_, id)| id).collect()
    } else {
        select_neighbors(&candidates, capacity, config.heuristic, Some(owner), |a, b| {
            graph.distance_between(a, b)
        })?
        .iter()
        .map(|&(_, id)| id)
        .collect()
    };
    graph.store().update_neighbors(owner, layer, &list)
}

/// Insert one vector into a published index and return its node id.
///
/// The vector is validated before anything is written, so a rejected insert
/// leaves the index untouched. Callers must serialize inserts; concurrent
/// searches are fine.
pub fn insert(store: &PageStore, tuple: TupleId, vector: &[f32]) -> Result<u32> {
    check_input(store, vector)?;
    if !store.is_published() {
        return Err(HnswError::Unpublished);
    }

    let graph = GraphIndex::new(store);
    let mut levels = LevelGenerator::for_insert(store.config(), store.len());
    let mut visited = VisitedSet::new(store.len() + 1);
    let entry = store.entry();
    let linked = insert_node(graph, &mut levels, entry, tuple, vector, &mut visited)?;

    let entry_point = match entry {
        Some((_, max_layer)) if linked.level <= max_layer => store.entry_point(),
        _ => Some(linked.id),
    };
    store.update_meta(entry_point)?;
    tracing::debug!(
        "Inserted tuple {} as node {} (level {}, entry point {:?})",
        tuple,
        linked.id,
        linked.level,
        entry_point
    );
    Ok(linked.id)
}
