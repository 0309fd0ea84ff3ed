use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_object::{header, ObjectInfo};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Read and inflate a loose object.
    ///
    /// Returns `(info, payload)` where `payload` excludes the object
    /// header, or `Ok(None)` if the object does not exist.
    pub fn read(
        &self,
        id: &grit_hash::ObjectId,
    ) -> Result<Option<(ObjectInfo, Vec<u8>)>, LooseError> {
        let compressed = match std::fs::read(self.object_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| LooseError::Decompress {
                id: id.to_hex(),
                source: e,
            })?;

        let info = header::parse(&inflated)?;
        if (inflated.len() as u64) < info.hdrlen as u64 + info.size {
            return Err(LooseError::Corrupt {
                id: id.to_hex(),
                reason: format!(
                    "declared size {} exceeds inflated length {}",
                    info.size,
                    inflated.len()
                ),
            });
        }
        inflated.drain(..info.hdrlen);
        inflated.truncate(info.size as usize);
        Ok(Some((info, inflated)))
    }

    /// Read just the header (kind, size, hdrlen) with a bounded inflate.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn read_info(
        &self,
        id: &grit_hash::ObjectId,
    ) -> Result<Option<ObjectInfo>, LooseError> {
        let compressed = match std::fs::read(self.object_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        // Object headers are short; 64 inflated bytes is plenty.
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; 64];
        let mut filled = 0;
        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Decompress {
                    id: id.to_hex(),
                    source: e,
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "EOF before header null terminator".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        Ok(Some(header::parse(&buf[..filled])?))
    }
}

#[cfg(test)]
mod tests {
    use crate::LooseStore;
    use grit_object::ObjectKind;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = store.write(ObjectKind::Blob, b"hello loose world").unwrap();

        let (info, payload) = store.read(&id).unwrap().unwrap();
        assert_eq!(info.kind, ObjectKind::Blob);
        assert_eq!(info.size, 17);
        assert_eq!(payload, b"hello loose world");
    }

    #[test]
    fn read_info_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = store.write(ObjectKind::Blob, &vec![0xaau8; 4096]).unwrap();

        let info = store.read_info(&id).unwrap().unwrap();
        assert_eq!(info.kind, ObjectKind::Blob);
        assert_eq!(info.size, 4096);
        assert_eq!(info.hdrlen, b"blob 4096\0".len());
    }

    #[test]
    fn missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = grit_hash::ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .unwrap();
        assert!(store.read(&id).unwrap().is_none());
        assert!(store.read_info(&id).unwrap().is_none());
        assert!(store.open_fd(&id).unwrap().is_none());
    }

    #[test]
    fn corrupt_object_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = grit_hash::ObjectId::from_hex("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            .unwrap();
        let path = store.object_path(&id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not zlib at all").unwrap();
        assert!(store.read(&id).is_err());
    }
}
