//! HNSW graph configuration and the per-layer search primitive.
//!
//! [`HnswConfig`] is the immutable configuration persisted in the meta page.
//! [`GraphIndex`] is a borrowed view over a [`PageStore`] that computes
//! distances and runs beam searches; it never caches graph state.

use crate::config;
use crate::error::Result;
use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::node::layer_capacity;
use crate::hnsw::visited::VisitedSet;
use crate::storage::PageStore;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;

/// Configuration parameters for an HNSW index.
///
/// Fixed at build time and stored in the meta page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Vector dimension.
    pub dimensions: usize,
    /// Maximum links per node on layers ≥ 1 (layer 0 holds `2 * m`).
    pub m: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Distance function for similarity computation.
    pub metric: DistanceMetric,
    /// Seed of the layer-assignment generator.
    pub random_seed: u64,
    /// Diversity heuristic for neighbor selection; plain closest-first when false.
    pub heuristic: bool,
}

impl HnswConfig {
    /// Default configuration for vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            metric: DistanceMetric::L2,
            random_seed: config::HNSW_DEFAULT_SEED,
            heuristic: true,
        }
    }

    /// Neighbor list capacity at `layer`.
    #[inline]
    pub fn capacity(&self, layer: usize) -> usize {
        layer_capacity(self.m, layer)
    }
}

/// Seeded source of node layers: `floor(-ln(U) / ln(M))`, `U ∈ (0, 1]`.
#[derive(Debug)]
pub struct LevelGenerator {
    rng: StdRng,
    /// `1 / ln(M)`; zero when `M == 1`, which keeps every node on layer 0.
    ml: f64,
}

impl LevelGenerator {
    /// Generator for a full build, seeded with `random_seed`.
    pub fn new(config: &HnswConfig) -> Self {
        Self::with_seed(config, config.random_seed)
    }

    /// Generator for a single insert into an index of `node_count` nodes.
    ///
    /// Replaying the same insert sequence against the same index reproduces
    /// the same layers.
    pub fn for_insert(config: &HnswConfig, node_count: usize) -> Self {
        let seed = config
            .random_seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(node_count as u64);
        Self::with_seed(config, seed)
    }

    fn with_seed(config: &HnswConfig, seed: u64) -> Self {
        let ml = if config.m > 1 {
            1.0 / (config.m as f64).ln()
        } else {
            0.0
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            ml,
        }
    }

    /// Draw the top layer of the next node.
    pub fn next_level(&mut self) -> usize {
        // gen() is in [0, 1); flip it into (0, 1] so ln never sees zero.
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        let level = (-u.ln() * self.ml).floor() as usize;
        level.min(config::HNSW_MAX_LAYERS - 1)
    }
}

/// Which visited nodes may appear in a [`GraphIndex::search_layer`] result.
///
/// Excluded nodes are still expanded, so tombstones keep the graph navigable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFilter {
    All,
    /// Skip tombstoned nodes.
    Live,
    /// Skip tombstoned nodes and the given id (a node relinking itself).
    LiveExcept(u32),
}

/// Min-heap entry for the candidate frontier, ties broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.distance, other.id).cmp(&(self.distance, self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap entry for the result set; the worst result sits on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.distance, self.id).cmp(&(other.distance, other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Borrowed view over a store for distance computation and layer search.
#[derive(Debug, Clone, Copy)]
pub struct GraphIndex<'a> {
    store: &'a PageStore,
}

impl<'a> GraphIndex<'a> {
    pub fn new(store: &'a PageStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a PageStore {
        self.store
    }

    pub fn config(&self) -> &'a HnswConfig {
        self.store.config()
    }

    /// Distance from `query` to node `id`.
    #[inline]
    pub fn distance(&self, query: &[f32], id: u32) -> Result<f32> {
        let slot = self.store.slot(id)?;
        Ok(self.config().metric.distance(query, &slot.vector))
    }

    /// Distance between two stored nodes.
    pub fn distance_between(&self, a: u32, b: u32) -> Result<f32> {
        let va = self.store.slot(a)?;
        let vb = self.store.slot(b)?;
        Ok(self.config().metric.distance(&va.vector, &vb.vector))
    }

    /// Beam search over one layer starting from `entry_points`.
    ///
    /// Returns up to `ef` nodes accepted by `filter`, as `(distance, id)`
    /// sorted ascending with ties broken by id. `visited` is cleared first.
    pub fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        filter: ResultFilter,
    ) -> Result<Vec<(f32, u32)>> {
        visited.clear();
        let ef = ef.max(1);
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
        // Cached worst accepted distance while `results` is full.
        let mut worst = f32::INFINITY;

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let dist = self.distance(query, ep)?;
            candidates.push(Candidate {
                distance: OrderedFloat(dist),
                id: ep,
            });
            if self.accepts(filter, ep)? {
                push_result(&mut results, &mut worst, ef, dist, ep);
            }
        }

        while let Some(candidate) = candidates.pop() {
            if results.len() >= ef && candidate.distance.0 > worst {
                break;
            }

            let slot = self.store.slot(candidate.id)?;
            let neighbors = slot.neighbors(layer);
            for &neighbor in neighbors.iter() {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = self.distance(query, neighbor)?;
                if results.len() < ef || dist < worst {
                    candidates.push(Candidate {
                        distance: OrderedFloat(dist),
                        id: neighbor,
                    });
                    if self.accepts(filter, neighbor)? {
                        push_result(&mut results, &mut worst, ef, dist, neighbor);
                    }
                }
            }
        }

        Ok(results
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.distance.0, r.id))
            .collect())
    }

    /// Greedy walk (beam width 1) from `entry` down to `bottom`, exclusive
    /// of layers below it. Returns the closest node found on `bottom`.
    pub fn greedy_descend(
        &self,
        query: &[f32],
        entry: u32,
        top: usize,
        bottom: usize,
        visited: &mut VisitedSet,
    ) -> Result<u32> {
        let mut current = entry;
        for layer in (bottom..=top).rev() {
            let found = self.search_layer(
                query,
                std::slice::from_ref(&current),
                1,
                layer,
                visited,
                ResultFilter::All,
            )?;
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }
        Ok(current)
    }

    #[inline]
    fn accepts(&self, filter: ResultFilter, id: u32) -> Result<bool> {
        Ok(match filter {
            ResultFilter::All => true,
            ResultFilter::Live => !self.store.slot(id)?.is_tombstoned(),
            ResultFilter::LiveExcept(skip) => id != skip && !self.store.slot(id)?.is_tombstoned(),
        })
    }
}

#[inline]
fn push_result(
    results: &mut BinaryHeap<ResultEntry>,
    worst: &mut f32,
    ef: usize,
    dist: f32,
    id: u32,
) {
    results.push(ResultEntry {
        distance: OrderedFloat(dist),
        id,
    });
    if results.len() > ef {
        results.pop();
    }
    if results.len() >= ef {
        *worst = results.peek().map_or(f32::INFINITY, |r| r.distance.0);
    }
}
