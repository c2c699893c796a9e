//! Hierarchical Navigable Small World (HNSW) graph over a [`PageStore`](crate::storage::PageStore).
//!
//! Every operation reads and writes nodes through the page store by `u32` id;
//! nothing here caches graph state between calls.

/// Bulk construction with deterministic layer assignment.
pub mod build;
/// Distance metrics: L2, inner product and cosine.
pub mod distance;
/// Graph configuration, layer generator and per-layer beam search.
pub mod graph;
/// Single-vector insertion with bidirectional linking.
pub mod insert;
/// Bulk delete and vacuum with neighbor repair.
pub mod maintain;
/// Node records and tuple handles.
pub mod node;
/// Multi-layer k-NN search and exact baseline.
pub mod search;
/// Neighbor selection heuristic.
pub mod select;
/// Generation-based visited set for efficient graph traversal.
pub mod visited;

pub use build::{build, BuildContext, BuildResult};
pub use distance::DistanceMetric;
pub use graph::{GraphIndex, HnswConfig, LevelGenerator, ResultFilter};
pub use insert::insert;
pub use maintain::{bulk_delete, vacuum_cleanup, BulkDeleteStats, VacuumStats};
pub use node::{Node, TupleId};
pub use search::{brute_force_search, knn_search, SearchHit};
