//! Bulk construction of a fresh index.
//!
//! Vectors are linked one at a time in input order with a single seeded
//! generator, so the same seed and order always produce the same graph. The
//! meta page is published only after every node page is written.

use crate::error::Result;
use crate::hnsw::graph::{GraphIndex, LevelGenerator};
use crate::hnsw::insert::{check_input, insert_node};
use crate::hnsw::node::TupleId;
use crate::hnsw::visited::VisitedSet;
use crate::storage::PageStore;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Summary returned by [`build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub node_count: usize,
    pub page_count: usize,
}

/// Mutable state owned by one build.
#[derive(Debug)]
pub struct BuildContext {
    levels: LevelGenerator,
    entry: Option<(u32, usize)>,
    visited: VisitedSet,
    inserted: usize,
}

impl BuildContext {
    pub fn new(store: &PageStore) -> Self {
        Self {
            levels: LevelGenerator::new(store.config()),
            entry: None,
            visited: VisitedSet::default(),
            inserted: 0,
        }
    }

    /// Entry point and global max layer so far.
    pub fn entry(&self) -> Option<(u32, usize)> {
        self.entry
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Validate and link one vector.
    pub fn add(&mut self, store: &PageStore, tuple: TupleId, vector: &[f32]) -> Result<u32> {
        check_input(store, vector)?;
        let linked = insert_node(
            GraphIndex::new(store),
            &mut self.levels,
            self.entry,
            tuple,
            vector,
            &mut self.visited,
        )?;
        if self.entry.map_or(true, |(_, max_layer)| linked.level > max_layer) {
            self.entry = Some((linked.id, linked.level));
        }
        self.inserted += 1;
        Ok(linked.id)
    }
}

/// Build the graph over `vectors` in iteration order and publish the meta page.
///
/// `store` must be freshly created. On error nothing is published and the
/// file stays unopenable.
pub fn build<I, V>(store: &PageStore, vectors: I) -> Result<BuildResult>
where
    I: IntoIterator<Item = (TupleId, V)>,
    V: AsRef<[f32]>,
{
    let start = Instant::now();
    let mut ctx = BuildContext::new(store);
    for (tuple, vector) in vectors {
        ctx.add(store, tuple, vector.as_ref())?;
    }

    store.sync()?;
    store.create_meta(ctx.entry().map(|(id, _)| id))?;

    let result = BuildResult {
        node_count: store.len(),
        page_count: store.page_count(),
    };
    tracing::info!(
        "Built HNSW index: {} nodes, {} pages, max layer {}, in {:.2?}",
        result.node_count,
        result.page_count,
        ctx.entry().map_or(0, |(_, l)| l),
        start.elapsed()
    );
    Ok(result)
}
