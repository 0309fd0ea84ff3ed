use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectKind};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Write a loose object, returning its id.
    ///
    /// The file is staged in a temp file beside the fanout directory and
    /// moved into place, so concurrent readers never observe a partial
    /// object. Writing an object that already exists is a no-op.
    pub fn write(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::encode(kind, payload.len() as u64);

        let mut hasher = Hasher::new();
        hasher.update(&hdr);
        hasher.update(payload);
        let id = hasher.finalize()?;

        let path = self.object_path(&id);
        if path.is_file() {
            return Ok(id);
        }
        let fanout_dir = path.parent().expect("loose path has a fanout dir");
        std::fs::create_dir_all(fanout_dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(fanout_dir)?;
        {
            let mut encoder = ZlibEncoder::new(tmp.as_file_mut(), Compression::default());
            encoder.write_all(&hdr)?;
            encoder.write_all(payload)?;
            encoder.finish()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o444);
            tmp.as_file().set_permissions(perms)?;
        }

        tmp.persist(&path).map_err(|e| LooseError::Io(e.error))?;
        Ok(id)
    }
}
