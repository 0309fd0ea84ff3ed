//! Loose object storage.
//!
//! Each loose object lives at `objects/xx/yyyy...` — the id's hex split
//! after the first byte — and holds zlib-deflated
//! `"<type> <size>\0<payload>"`.

mod read;
mod write;

use std::fs::File;
use std::path::{Path, PathBuf};

use grit_hash::{ObjectId, HEX_LEN};

/// Interface to the loose half of an object directory.
pub struct LooseStore {
    objects_dir: PathBuf,
}

impl LooseStore {
    /// Open the loose store rooted at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// File path for a given id.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.objects_dir.join(id.loose_path())
    }

    /// Does a loose object with this id exist?
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Open the deflated object file, for hand-off to a privsep worker.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn open_fd(&self, id: &ObjectId) -> Result<Option<File>, LooseError> {
        match File::open(self.object_path(id)) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LooseError::Io(e)),
        }
    }

    /// List the ids under one fanout directory (`"xx"`), in directory order.
    ///
    /// Entries whose names do not form a valid id are skipped; a missing
    /// fanout directory yields an empty list.
    pub fn scan_fanout_dir(&self, fanout: &str) -> Result<Vec<ObjectId>, LooseError> {
        let dir = self.objects_dir.join(fanout);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() != HEX_LEN - 2 {
                continue;
            }
            if let Ok(id) = ObjectId::from_hex(&format!("{fanout}{name}")) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("decompression error for {id}: {source}")]
    Decompress {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}
