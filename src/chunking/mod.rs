//! Hierarchical chunking and contextual enrichment.
//!
//! Documents split into a three-level tree (1024 -> 512 -> 128 character
//! targets); the 128-character leaves are the indexed retrieval units.
//! Each leaf gets a deterministic context prefix prepended before
//! embedding.

pub mod context;
pub mod hierarchical;

pub use context::{ContextEnricher, MAX_PREFIX_CHARS};
pub use hierarchical::{HierarchicalChunker, PageSpan};

/// Chunk-size sequence from root slices to leaves, in characters.
pub const LEVEL_SIZES: [usize; 3] = [1024, 512, 128];

/// Maximum overlap between consecutive leaves, in characters.
pub const MAX_OVERLAP: usize = 64;
