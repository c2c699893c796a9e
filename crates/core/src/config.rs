//! Global configuration constants for the HNSW access method.
//!
//! Defaults and validation bounds for index options, plus the on-disk format
//! constants. Runtime configuration is an [`IndexOptions`](crate::am::IndexOptions)
//! value checked by [`validate_options`](crate::am::validate_options).

/// Default number of bidirectional links per HNSW node on layers ≥ 1.
///
/// Layer 0 holds twice as many. Higher values improve recall but increase
/// page size and build time. Typical range: 8–64.
pub const HNSW_DEFAULT_M: usize = 16;

/// Smallest accepted `M`.
pub const HNSW_MIN_M: usize = 1;

/// Largest accepted `M`. Bounds the fixed node page size.
pub const HNSW_MAX_M: usize = 100;

/// Default ef parameter during index construction.
///
/// Controls the size of the dynamic candidate list while linking a new node.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 64;

/// Largest accepted `ef_construction`.
pub const HNSW_MAX_EF_CONSTRUCTION: usize = 1000;

/// Default ef parameter during search when the caller has no preference.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 40;

/// Maximum number of layers in the graph. Drawn levels are clamped below this.
pub const HNSW_MAX_LAYERS: usize = 16;

/// Default seed for the layer-assignment generator.
pub const HNSW_DEFAULT_SEED: u64 = 42;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 16_000;

/// Size of the meta page at the head of every index file.
pub const META_PAGE_SIZE: usize = 4096;

/// Magic bytes opening a published meta page.
pub const META_MAGIC: &[u8; 8] = b"HNSWMETA";

/// Magic number opening every node page.
pub const NODE_MAGIC: u32 = 0x4e4f_4445; // "NODE"

/// On-disk format version written into the meta page.
pub const FORMAT_VERSION: u16 = 1;
