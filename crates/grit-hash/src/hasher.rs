use digest::Digest;

use crate::{HashError, ObjectId, DIGEST_LEN};

/// Streaming SHA-1 computation with collision detection.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation, then finalised into an
/// [`ObjectId`]. Finalisation fails if the shattered-SHA-1 detector fires.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::from_bytes(&bytes).expect("digest has the right length"))
    }

    /// Convenience: hash a byte slice in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash an object: `"<type> <len>\0<payload>"`.
    pub fn hash_object(obj_type: &str, payload: &[u8]) -> Result<ObjectId, HashError> {
        let header = format!("{} {}\0", obj_type, payload.len());
        let mut h = Self::new();
        h.update(header.as_bytes());
        h.update(payload);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest() {
        let oid = Hasher::digest(b"").unwrap();
        assert_eq!(oid.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = Hasher::new();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize().unwrap(), Hasher::digest(b"hello world").unwrap());
    }

    #[test]
    fn hash_object_blob() {
        // Matches `echo -n 'what is up, doc?' | git hash-object --stdin`.
        let oid = Hasher::hash_object("blob", b"what is up, doc?").unwrap();
        assert_eq!(oid.to_hex(), "bd9dbf5aae1a3862dd1526723246b20206e5fc37");
    }

    #[test]
    fn write_impl() {
        use std::io::Write;
        let mut h = Hasher::new();
        h.write_all(b"hello world").unwrap();
        assert_eq!(h.finalize().unwrap(), Hasher::digest(b"hello world").unwrap());
    }
}
