//! # hnswam-core
//!
//! HNSW approximate nearest-neighbor index engine packaged as a database
//! access method. The graph lives in a single page file: a checksummed meta
//! page followed by fixed-size node pages addressed by stable `u32` ids.
//!
//! The host drives the index through [`am::HnswIndex`]: build, insert,
//! ordered scans, bulk delete and vacuum. Lower layers are public for hosts
//! that manage locking themselves.

/// Host call contract: build, insert, scan, delete and vacuum entry points.
pub mod am;
/// Global configuration constants: limits, defaults and on-disk format values.
pub mod config;
/// Error type and `Result` alias.
pub mod error;
/// HNSW graph algorithms: construction, search, neighbor selection and maintenance.
pub mod hnsw;
/// Page codec and page store backing every index.
pub mod storage;

pub use am::{validate_options, HnswIndex, IndexOptions, IndexStats, ScanHandle, ScanItem};
pub use error::{HnswError, Result};
pub use hnsw::{DistanceMetric, HnswConfig, TupleId};
