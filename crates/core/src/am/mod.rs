//! Host call contract: the access-method entry points.
//!
//! [`HnswIndex`] owns a [`PageStore`] behind a `parking_lot::RwLock`. Scans,
//! inserts and bulk deletes share the read side; vacuum takes the write side
//! because it renumbers nodes. Inserts and bulk deletes are additionally
//! serialized by a writer mutex so that at most one of them mutates the graph.

/// Index creation options and validation.
pub mod options;
/// Scan handles returned by [`HnswIndex::begin_scan`].
pub mod scan;

pub use options::{validate_options, IndexOptions};
pub use scan::{ScanHandle, ScanItem};

use crate::error::Result;
use crate::hnsw::{
    self, BuildResult, BulkDeleteStats, HnswConfig, Node, SearchHit, TupleId, VacuumStats,
};
use crate::storage::PageStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Point-in-time summary of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub path: Option<PathBuf>,
    pub dimensions: usize,
    pub options: IndexOptions,
    /// Nodes stored, tombstones included.
    pub node_count: usize,
    pub live_count: usize,
    pub tombstones: usize,
    pub max_layer: Option<usize>,
    pub entry_point: Option<u32>,
    pub page_count: usize,
}

/// An HNSW index as driven by the host.
#[derive(Debug)]
pub struct HnswIndex {
    store: RwLock<PageStore>,
    write_lock: Mutex<()>,
}

impl HnswIndex {
    fn from_store(store: PageStore) -> Self {
        Self {
            store: RwLock::new(store),
            write_lock: Mutex::new(()),
        }
    }

    /// Create an index file at `path` and build it over `vectors`.
    ///
    /// Options are validated before the file is touched. If the build fails
    /// the file is left unpublished and [`open`](Self::open) rejects it.
    pub fn build<I, V>(
        path: &Path,
        options: IndexOptions,
        dimensions: usize,
        vectors: I,
    ) -> Result<(Self, BuildResult)>
    where
        I: IntoIterator<Item = (TupleId, V)>,
        V: AsRef<[f32]>,
    {
        let config = options.into_config(dimensions)?;
        let store = PageStore::create(path, config)?;
        let result = hnsw::build(&store, vectors)?;
        Ok((Self::from_store(store), result))
    }

    /// Same as [`build`](Self::build) without a backing file.
    pub fn build_in_memory<I, V>(
        options: IndexOptions,
        dimensions: usize,
        vectors: I,
    ) -> Result<(Self, BuildResult)>
    where
        I: IntoIterator<Item = (TupleId, V)>,
        V: AsRef<[f32]>,
    {
        let config = options.into_config(dimensions)?;
        let store = PageStore::in_memory(config);
        let result = hnsw::build(&store, vectors)?;
        Ok((Self::from_store(store), result))
    }

    /// Open a published index file.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_store(PageStore::open(path)?))
    }

    pub fn config(&self) -> HnswConfig {
        self.store.read().config().clone()
    }

    /// Insert one tuple. Returns the new node id.
    pub fn insert(&self, tuple: TupleId, vector: &[f32]) -> Result<u32> {
        let _writer = self.write_lock.lock();
        let store = self.store.read();
        hnsw::insert(&store, tuple, vector)
    }

    /// Start an ordered scan for the `k` nearest tuples to `query`.
    pub fn begin_scan(&self, query: &[f32], k: usize, ef: usize) -> Result<ScanHandle> {
        let store = self.store.read();
        let hits = hnsw::knn_search(&store, query, k, ef)?;
        Ok(ScanHandle::new(hits, store.config().metric))
    }

    /// Raw search hits with internal distances and node ids.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchHit>> {
        hnsw::knn_search(&self.store.read(), query, k, ef)
    }

    /// Exact search over every live node.
    pub fn brute_force(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        hnsw::brute_force_search(&self.store.read(), query, k)
    }

    /// Tombstone every tuple for which `is_dead` returns true.
    pub fn bulk_delete<F>(&self, is_dead: F) -> Result<BulkDeleteStats>
    where
        F: FnMut(TupleId) -> bool,
    {
        let _writer = self.write_lock.lock();
        let store = self.store.read();
        hnsw::bulk_delete(&store, is_dead)
    }

    /// Repair the graph around tombstones and reclaim their pages.
    pub fn vacuum_cleanup(&self) -> Result<VacuumStats> {
        let _writer = self.write_lock.lock();
        let mut store = self.store.write();
        hnsw::vacuum_cleanup(&mut store)
    }

    /// Owned snapshot of node `id`.
    pub fn read_node(&self, id: u32) -> Result<Node> {
        self.store.read().read_node(id)
    }

    pub fn stats(&self) -> IndexStats {
        let store = self.store.read();
        let node_count = store.len();
        let tombstones = store.tombstone_count();
        IndexStats {
            path: store.path().map(Path::to_path_buf),
            dimensions: store.config().dimensions,
            options: IndexOptions::from(store.config()),
            node_count,
            live_count: node_count - tombstones,
            tombstones,
            max_layer: store.entry().map(|(_, layer)| layer),
            entry_point: store.entry_point(),
            page_count: store.page_count(),
        }
    }
}
