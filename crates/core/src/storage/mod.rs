//! Storage layer: the page codec and the page store.
//!
//! One file per index: a fixed-size meta page followed by one fixed-size page
//! per node. Every page carries a CRC32 checksum. The meta page is published
//! last during a build and the file is rewritten through a temp file and an
//! atomic rename during vacuum.

/// Meta and node page encoding with CRC32 checksums.
pub mod page;
/// Id-addressed node arena backed by the index file.
pub mod store;

pub use page::{MetaPage, NodePage};
pub use store::{PageStore, ReclaimOutcome};
