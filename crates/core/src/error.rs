//! Error type shared by every layer of the engine.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HnswError>;

/// Failures surfaced to the host.
///
/// `DimensionMismatch`, `InvalidVector` and `InvalidOptions` are user errors and
/// are reported before any mutation happens. `CorruptPage` and `Unpublished`
/// make the index unusable until it is rebuilt.
#[derive(Debug, thiserror::Error)]
pub enum HnswError {
    /// Vector length differs from the index dimension.
    #[error("expected {expected} dimensions, not {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector would produce an undefined (NaN) distance.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Index options rejected at validation time.
    #[error("invalid index options: {0}")]
    InvalidOptions(String),

    /// Checksum, magic or version mismatch while reading a page.
    #[error("index storage corrupted at offset {offset}: {reason}")]
    CorruptPage { offset: u64, reason: String },

    /// The index file has no published meta page (build never completed).
    #[error("index has no published meta page; the build did not complete")]
    Unpublished,

    /// Node id outside the arena.
    #[error("node {0} does not exist")]
    NodeNotFound(u32),

    /// Neighbor-list access above a node's top layer.
    #[error("node {id} has no layer {layer}")]
    LayerOutOfRange { id: u32, layer: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HnswError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        HnswError::CorruptPage {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by caller input rather than storage.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            HnswError::DimensionMismatch { .. }
                | HnswError::InvalidVector(_)
                | HnswError::InvalidOptions(_)
        )
    }
}
