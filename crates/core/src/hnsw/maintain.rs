//! Deletion and vacuum.
//!
//! [`bulk_delete`] only tombstones. [`vacuum_cleanup`] repairs every list that
//! points at a tombstone, moves the entry point off a tombstone, and then
//! reclaims the dead pages. Repair is best effort: a list may come back
//! shorter, but it never keeps a reference to a reclaimed node.

use crate::error::Result;
use crate::hnsw::graph::{GraphIndex, ResultFilter};
use crate::hnsw::node::TupleId;
use crate::hnsw::select::select_neighbors;
use crate::hnsw::visited::VisitedSet;
use crate::storage::PageStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// Result of [`bulk_delete`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteStats {
    /// Nodes tombstoned by this call.
    pub tuples_removed: usize,
    /// Live nodes remaining.
    pub num_index_tuples: usize,
}

/// Result of [`vacuum_cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacuumStats {
    /// Neighbor lists rewritten because they referenced a tombstone.
    pub lists_repaired: usize,
    /// Repaired lists that ended up shorter than before.
    pub short_lists: usize,
    pub nodes_reclaimed: usize,
    pub num_index_tuples: usize,
    /// Pages in the index file after reclamation, meta page included.
    pub num_pages: usize,
}

/// Tombstone every live node whose tuple satisfies `is_dead`.
///
/// Neighbor lists are left alone; searches keep walking through the
/// tombstones until the next vacuum.
pub fn bulk_delete<F>(store: &PageStore, mut is_dead: F) -> Result<BulkDeleteStats>
where
    F: FnMut(TupleId) -> bool,
{
    let mut stats = BulkDeleteStats::default();
    for id in 0..store.len() as u32 {
        let slot = store.slot(id)?;
        if slot.is_tombstoned() {
            continue;
        }
        if is_dead(slot.tuple) && store.mark_deleted(id)? {
            stats.tuples_removed += 1;
        } else {
            stats.num_index_tuples += 1;
        }
    }
    store.sync()?;
    tracing::debug!(
        "Bulk delete tombstoned {} node(s), {} live",
        stats.tuples_removed,
        stats.num_index_tuples
    );
    Ok(stats)
}

/// Repair lists around tombstones, then reclaim tombstoned nodes.
///
/// Takes the store exclusively: ids are renumbered at the end.
pub fn vacuum_cleanup(store: &mut PageStore) -> Result<VacuumStats> {
    let start = Instant::now();
    let mut stats = VacuumStats::default();

    let count = store.len();
    let mut dead = Vec::with_capacity(count);
    for id in 0..count as u32 {
        dead.push(store.slot(id)?.is_tombstoned());
    }
    let reclaimable = dead.iter().filter(|&&d| d).count();
    if reclaimable == 0 {
        stats.num_index_tuples = count;
        stats.num_pages = store.page_count();
        return Ok(stats);
    }

    let entry_point = {
        let graph = GraphIndex::new(store);
        let entry = match store.entry_point() {
            Some(ep) if !dead[ep as usize] => Some(ep),
            _ => highest_survivor(store, &dead)?,
        };
        let mut repairer = Repairer {
            graph,
            dead: &dead,
            entry,
            visited: VisitedSet::new(count),
        };
        for id in 0..count as u32 {
            if !dead[id as usize] {
                repairer.repair_node(id, &mut stats)?;
            }
        }
        entry
    };

    let outcome = store.reclaim(entry_point)?;
    stats.nodes_reclaimed = outcome.reclaimed;
    stats.num_index_tuples = store.len();
    stats.num_pages = store.page_count();

    tracing::info!(
        "Vacuum reclaimed {} node(s), repaired {} list(s) ({} short), {} live, in {:.2?}",
        stats.nodes_reclaimed,
        stats.lists_repaired,
        stats.short_lists,
        stats.num_index_tuples,
        start.elapsed()
    );
    Ok(stats)
}

/// Surviving node with the most layers, lowest id on ties.
fn highest_survivor(store: &PageStore, dead: &[bool]) -> Result<Option<u32>> {
    let mut best: Option<(u32, usize)> = None;
    for (id, &is_dead) in dead.iter().enumerate() {
        if is_dead {
            continue;
        }
        let layers = store.slot(id as u32)?.layer_count();
        if best.map_or(true, |(_, top)| layers > top) {
            best = Some((id as u32, layers));
        }
    }
    Ok(best.map(|(id, _)| id))
}

struct Repairer<'a> {
    graph: GraphIndex<'a>,
    dead: &'a [bool],
    /// Entry point after vacuum; always a survivor.
    entry: Option<u32>,
    visited: VisitedSet,
}

impl Repairer<'_> {
    fn is_dead(&self, id: u32) -> bool {
        self.dead.get(id as usize).copied().unwrap_or(true)
    }

    fn repair_node(&mut self, id: u32, stats: &mut VacuumStats) -> Result<()> {
        let store = self.graph.store();
        let layers = store.slot(id)?.layer_count();
        for layer in 0..layers {
            let list = store.slot(id)?.neighbors(layer);
            if !list.iter().any(|&n| self.is_dead(n)) {
                continue;
            }

            // Surviving neighbors plus the survivors one hop past each tombstone.
            let mut pool: HashSet<u32> = HashSet::new();
            for &n in list.iter() {
                if !self.is_dead(n) {
                    pool.insert(n);
                    continue;
                }
                for &m in store.slot(n)?.neighbors(layer).iter() {
                    if m != id && !self.is_dead(m) {
                        pool.insert(m);
                    }
                }
            }

            let mut candidates = Vec::with_capacity(pool.len());
            for &c in &pool {
                candidates.push((self.graph.distance_between(id, c)?, c));
            }
            let config = self.graph.config();
            let mut selected = select_neighbors(
                &candidates,
                config.capacity(layer),
                config.heuristic,
                Some(id),
                |a, b| self.graph.distance_between(a, b),
            )?;
            if selected.is_empty() {
                selected = self.search_replacements(id, layer)?;
            }

            let repaired: Vec<u32> = selected.iter().map(|&(_, n)| n).collect();
            if repaired.len() < list.len() {
                stats.short_lists += 1;
                tracing::debug!(
                    "Node {} layer {} relinked with {} of {} neighbor(s)",
                    id,
                    layer,
                    repaired.len(),
                    list.len()
                );
            }
            store.update_neighbors(id, layer, &repaired)?;
            stats.lists_repaired += 1;
        }
        Ok(())
    }

    /// Fresh neighbors for a node cut off by tombstones, found by searching
    /// from the entry point.
    fn search_replacements(&mut self, id: u32, layer: usize) -> Result<Vec<(f32, u32)>> {
        let Some(entry) = self.entry else {
            return Ok(Vec::new());
        };
        let store = self.graph.store();
        let entry_top = store.slot(entry)?.layer_count() - 1;
        if entry_top < layer {
            return Ok(Vec::new());
        }
        let vector = store.slot(id)?.vector.clone();
        let start = if entry_top > layer {
            self.graph
                .greedy_descend(&vector, entry, entry_top, layer + 1, &mut self.visited)?
        } else {
            entry
        };
        let config = self.graph.config();
        let found = self.graph.search_layer(
            &vector,
            std::slice::from_ref(&start),
            config.ef_construction,
            layer,
            &mut self.visited,
            ResultFilter::LiveExcept(id),
        )?;
        select_neighbors(
            &found,
            config.capacity(layer),
            config.heuristic,
            Some(id),
            |a, b| self.graph.distance_between(a, b),
        )
    }
}
