//! Object model for the grit repository engine.
//!
//! Provides the four object kinds, their parsing from raw bytes and
//! serialisation to canonical form, the `"<type> <size>\0"` header codec,
//! the raw-object hand-off shape used by the privsep workers, and the
//! per-kind bounded caches.

mod blob;
pub mod cache;
mod commit;
pub mod header;
mod raw;
mod signature;
mod tag;
mod tree;

pub use blob::Blob;
pub use cache::{CacheHint, ObjectCache, ObjectCaches};
pub use commit::Commit;
pub use raw::{RawData, RawObject};
pub use signature::Signature;
pub use tag::Tag;
pub use tree::{FileMode, Tree, TreeEntry};

use bstr::BString;
use grit_hash::HashError;

/// Errors produced by object parsing and serialisation.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid tag: missing '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four object kinds, with their pack entry type numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
}

impl ObjectKind {
    /// Parse from the type tag in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    /// Parse from a pack entry type number.
    pub fn from_pack_type(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }

    /// The canonical byte tag.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Commit => b"commit",
            Self::Tree => b"tree",
            Self::Blob => b"blob",
            Self::Tag => b"tag",
        }
    }

    /// Human-readable label, as used in "no such object" messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// Header-level description of an object: its kind, the declared payload
/// size, and the length of the `"<type> <size>\0"` prefix preceding the
/// payload on disk and in packs.
///
/// This is the shape the read-object worker hands back over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub size: u64,
    pub hdrlen: usize,
}
