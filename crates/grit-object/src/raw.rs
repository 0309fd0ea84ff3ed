use std::fs::File;

use crate::{ObjectError, ObjectInfo};

/// Raw object payload as handed back by the read-object worker: small
/// objects arrive inline over the bus, bulk data lands in a parent-supplied
/// file.
#[derive(Debug)]
pub enum RawData {
    Inline(Vec<u8>),
    File(File),
}

/// An undecoded object: full inflated bytes (header included) plus the
/// header geometry needed to slice the payload out.
#[derive(Debug)]
pub struct RawObject {
    pub info: ObjectInfo,
    pub data: RawData,
}

impl RawObject {
    /// Total inflated length: header plus payload.
    pub fn total_len(&self) -> u64 {
        self.info.hdrlen as u64 + self.info.size
    }

    /// Payload bytes with the `"<type> <size>\0"` prefix stripped.
    ///
    /// File-backed objects are read positionally from the start, so the
    /// call does not disturb (or depend on) the file offset and works
    /// through a shared reference.
    pub fn payload(&self) -> Result<Vec<u8>, ObjectError> {
        let mut full = Vec::new();
        match &self.data {
            RawData::Inline(bytes) => full.extend_from_slice(bytes),
            RawData::File(f) => {
                use std::os::unix::fs::FileExt;
                let mut offset = 0u64;
                let mut chunk = [0u8; 8192];
                loop {
                    let n = f
                        .read_at(&mut chunk, offset)
                        .map_err(|e| ObjectError::InvalidHeader(format!("raw read: {e}")))?;
                    if n == 0 {
                        break;
                    }
                    full.extend_from_slice(&chunk[..n]);
                    offset += n as u64;
                }
            }
        }
        if (full.len() as u64) < self.total_len() {
            return Err(ObjectError::Truncated {
                expected: self.total_len() as usize,
                actual: full.len(),
            });
        }
        full.drain(..self.info.hdrlen);
        full.truncate(self.info.size as usize);
        Ok(full)
    }
}
