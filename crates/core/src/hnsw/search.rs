//! Multi-layer k-NN search.
//!
//! Greedy descent with beam width 1 down to layer 1, then a beam search of
//! width `ef` on layer 0. Tombstoned nodes are walked through but never
//! returned. Distances are internal (squared for L2).

use crate::error::Result;
use crate::hnsw::graph::{GraphIndex, ResultFilter};
use crate::hnsw::insert::check_input;
use crate::hnsw::node::TupleId;
use crate::hnsw::visited::VisitedSet;
use crate::storage::PageStore;
use std::cell::RefCell;

thread_local! {
    /// Per-thread visited set reused across queries.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: u32,
    pub tuple: TupleId,
    /// Internal distance; see [`crate::hnsw::DistanceMetric::to_reported`].
    pub distance: f32,
}

/// Return the `k` closest live nodes to `query`, nearest first.
///
/// `ef` is raised to `k` when smaller. `k == 0` or an empty index yields an
/// empty result.
pub fn knn_search(store: &PageStore, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchHit>> {
    check_input(store, query)?;
    let Some((entry_point, max_layer)) = store.entry() else {
        return Ok(Vec::new());
    };
    if k == 0 {
        return Ok(Vec::new());
    }
    let ef = ef.max(k);
    let graph = GraphIndex::new(store);

    let found = SEARCH_VISITED.with(|cell| -> Result<Vec<(f32, u32)>> {
        let mut visited = cell.borrow_mut();
        let start = if max_layer > 0 {
            graph.greedy_descend(query, entry_point, max_layer, 1, &mut visited)?
        } else {
            entry_point
        };
        graph.search_layer(
            query,
            std::slice::from_ref(&start),
            ef,
            0,
            &mut visited,
            ResultFilter::Live,
        )
    })?;

    found
        .into_iter()
        .take(k)
        .map(|(distance, id)| {
            Ok(SearchHit {
                id,
                tuple: store.slot(id)?.tuple,
                distance,
            })
        })
        .collect()
}

/// Exact k-NN by linear scan over live nodes. Used as recall ground truth.
pub fn brute_force_search(store: &PageStore, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    check_input(store, query)?;
    let metric = store.config().metric;
    let mut hits = Vec::with_capacity(store.len());
    for id in 0..store.len() as u32 {
        let slot = store.slot(id)?;
        if slot.is_tombstoned() {
            continue;
        }
        hits.push(SearchHit {
            id,
            tuple: slot.tuple,
            distance: metric.distance(query, &slot.vector),
        });
    }
    hits.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
    hits.truncate(k);
    Ok(hits)
}
