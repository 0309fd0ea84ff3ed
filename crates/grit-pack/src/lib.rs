//! Pack file and pack index reading.
//!
//! Packs aggregate many objects, often delta-compressed against one
//! another; a parallel `.idx` file maps ids to in-pack offsets. This crate
//! reads both formats, resolves delta chains, and provides the Bloom
//! filter used to prune negative index lookups.

pub mod bloom;
pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;

pub use bloom::Bloom;
pub use index::PackIndex;
pub use pack::Pack;

use grit_hash::ObjectId;

/// Errors from pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack index: {0}")]
    BadPackIdx(String),

    #[error("bad pack file: {0}")]
    BadPackfile(String),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("invalid delta at offset {offset}: {reason}")]
    BadDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain exceeds {max} levels at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// Pack file format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants. Version 1 indexes are refused.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Maximum delta chain depth before extraction bails out.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 50;

/// Indexes with more objects than this do not get a Bloom filter: a pack
/// that large holds a big share of the repository's objects, so the filter
/// would mostly answer "maybe" while costing a full id sweep to build.
pub const BLOOM_MAX_OBJECTS: u32 = 100_000;
