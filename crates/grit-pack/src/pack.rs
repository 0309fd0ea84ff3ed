//! Pack file reading and delta-chain resolution.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use grit_hash::ObjectId;
use grit_object::ObjectKind;

use crate::entry::{self, EntryKind};
use crate::index::PackIndex;
use crate::{PackError, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Backing storage for an open pack: a private read-only mapping, or the
/// bare file when mapping failed with ENOMEM.
enum PackData {
    Mapped(memmap2::Mmap),
    File(File),
}

/// An open, header-validated pack file.
pub struct Pack {
    data: PackData,
    path: PathBuf,
    filesize: u64,
    nobjects: u32,
}

impl Pack {
    /// Open a pack file and validate its header against the index.
    ///
    /// The object count in the pack header must match `fanout[255]` of the
    /// index; a disagreement means one of the two files is stale or
    /// corrupt.
    pub fn open(path: impl AsRef<Path>, idx: &PackIndex) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = open_nofollow(&path)?;
        let filesize = file.metadata()?.len();

        if filesize < PACK_HEADER_SIZE as u64 {
            return Err(PackError::BadPackfile("file too small".into()));
        }

        let data = match unsafe { memmap2::Mmap::map(&file) } {
            Ok(map) => PackData::Mapped(map),
            Err(e) if e.raw_os_error() == Some(libc::ENOMEM) => PackData::File(file),
            Err(e) => return Err(PackError::Io(e)),
        };

        let pack = Self {
            data,
            path,
            filesize,
            nobjects: 0,
        };

        let mut header = [0u8; PACK_HEADER_SIZE];
        pack.read_exact_at(0, &mut header)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::BadPackfile("bad signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::BadPackfile(format!(
                "unsupported version {version}"
            )));
        }
        let nobjects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        if nobjects != idx.nobjects() {
            return Err(PackError::BadPackfile(format!(
                "pack has {nobjects} objects but index has {}",
                idx.nobjects()
            )));
        }

        Ok(Self { nobjects, ..pack })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn nobjects(&self) -> u32 {
        self.nobjects
    }

    /// Is this pack backed by a memory mapping (as opposed to read(2))?
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, PackData::Mapped(_))
    }

    /// Extract the object at `offset`, resolving any delta chain.
    ///
    /// Chains are walked iteratively with an explicit stack of delta
    /// scripts; depth is capped at [`MAX_DELTA_CHAIN_DEPTH`]. REF_DELTA
    /// bases missing from `idx` are looked up through `resolver`
    /// (cross-pack or loose).
    pub fn extract(
        &self,
        offset: u64,
        idx: &PackIndex,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<(ObjectKind, Vec<u8>), PackError> {
        // Innermost delta first; applied in reverse once the base is known.
        let mut deltas: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut current = offset;

        loop {
            if deltas.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max: MAX_DELTA_CHAIN_DEPTH,
                });
            }

            let hdr = self.entry_header(current)?;
            match hdr.kind {
                EntryKind::Plain(kind) => {
                    let base = self.inflate(hdr.data_offset, hdr.size, current)?;
                    return finish_chain(kind, base, &deltas);
                }
                EntryKind::OfsDelta { base_offset } => {
                    let script = self.inflate(hdr.data_offset, hdr.size, current)?;
                    deltas.push((current, script));
                    current = base_offset;
                }
                EntryKind::RefDelta { base_id } => {
                    let script = self.inflate(hdr.data_offset, hdr.size, current)?;
                    deltas.push((current, script));
                    if let Some(i) = idx.find_index(&base_id) {
                        current = idx.offset_at(i)?;
                    } else if let Some((kind, base)) = resolver(&base_id) {
                        return finish_chain(kind, base, &deltas);
                    } else {
                        return Err(PackError::MissingBase(base_id));
                    }
                }
            }
        }
    }

    /// Resolve only the object kind at `offset`, without inflating payloads.
    ///
    /// Walks the delta chain reading entry headers alone; REF_DELTA bases
    /// outside this pack are answered by `resolver`.
    pub fn kind_at(
        &self,
        offset: u64,
        idx: &PackIndex,
        resolver: impl Fn(&ObjectId) -> Option<ObjectKind>,
    ) -> Result<ObjectKind, PackError> {
        let mut current = offset;
        for _ in 0..=MAX_DELTA_CHAIN_DEPTH {
            let hdr = self.entry_header(current)?;
            match hdr.kind {
                EntryKind::Plain(kind) => return Ok(kind),
                EntryKind::OfsDelta { base_offset } => current = base_offset,
                EntryKind::RefDelta { base_id } => {
                    if let Some(i) = idx.find_index(&base_id) {
                        current = idx.offset_at(i)?;
                    } else {
                        return resolver(&base_id).ok_or(PackError::MissingBase(base_id));
                    }
                }
            }
        }
        Err(PackError::DeltaChainTooDeep {
            offset,
            max: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// The declared size in the entry header at `offset` (payload size for
    /// plain entries, delta-script size for deltas).
    pub fn entry_size(&self, offset: u64) -> Result<u64, PackError> {
        Ok(self.entry_header(offset)?.size)
    }

    fn entry_header(&self, offset: u64) -> Result<entry::EntryHeader, PackError> {
        if offset < PACK_HEADER_SIZE as u64 || offset >= self.filesize {
            return Err(PackError::CorruptEntry(offset));
        }
        // Entry headers are at most ~30 bytes (varint size + base id).
        let want = 32.min((self.filesize - offset) as usize);
        let mut buf = vec![0u8; want];
        self.read_exact_at(offset, &mut buf)?;
        entry::parse_header(&buf, offset)
    }

    /// Inflate `expected` bytes of zlib data starting at `data_offset`.
    fn inflate(
        &self,
        data_offset: u64,
        expected: u64,
        entry_offset: u64,
    ) -> Result<Vec<u8>, PackError> {
        let cursor = PackCursor {
            pack: self,
            pos: data_offset,
        };
        let mut decoder = ZlibDecoder::new(cursor);
        let mut out = Vec::with_capacity(expected as usize);
        decoder
            .read_to_end(&mut out)
            .map_err(|_| PackError::CorruptEntry(entry_offset))?;
        if out.len() as u64 != expected {
            return Err(PackError::CorruptEntry(entry_offset));
        }
        Ok(out)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        match &self.data {
            PackData::Mapped(map) => {
                if offset >= map.len() as u64 {
                    return Ok(0);
                }
                let start = offset as usize;
                let n = buf.len().min(map.len() - start);
                buf[..n].copy_from_slice(&map[start..start + n]);
                Ok(n)
            }
            PackData::File(file) => {
                use std::os::unix::fs::FileExt;
                file.read_at(buf, offset)
            }
        }
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), PackError> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read_at(offset + done as u64, &mut buf[done..])?;
            if n == 0 {
                return Err(PackError::CorruptEntry(offset));
            }
            done += n;
        }
        Ok(())
    }
}

fn finish_chain(
    kind: ObjectKind,
    base: Vec<u8>,
    deltas: &[(u64, Vec<u8>)],
) -> Result<(ObjectKind, Vec<u8>), PackError> {
    let mut data = base;
    for (at, script) in deltas.iter().rev() {
        data = crate::delta::apply(&data, script, *at)?;
    }
    Ok((kind, data))
}

/// `Read` over pack bytes from a running position, for the zlib decoder.
struct PackCursor<'a> {
    pack: &'a Pack,
    pos: u64,
}

impl Read for PackCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.pack.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

fn open_nofollow(path: &Path) -> Result<File, PackError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(path)?)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::entry::{encode_header, encode_ofs_delta_offset};
    use crate::index::testutil::build_index;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use grit_hash::Hasher;
    use std::io::Write;

    pub enum FixtureEntry<'a> {
        Plain(ObjectKind, &'a [u8]),
        /// Delta against the entry at the given fixture position.
        OfsDelta(usize, &'a [u8]),
        /// Delta against an arbitrary base id (possibly external).
        RefDelta(ObjectId, &'a [u8], &'a [u8]),
    }

    pub struct Fixture {
        pub pack_path: PathBuf,
        pub idx_path: PathBuf,
        pub ids: Vec<ObjectId>,
        pub offsets: Vec<u64>,
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut enc = ZlibEncoder::new(&mut out, Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap();
        out
    }

    /// Assemble a valid .pack/.idx pair from the given entries.
    ///
    /// Delta entries record the *target* payload; the delta script is
    /// computed here. Ids for delta entries are hashed from the target
    /// payload so index lookups behave like the real thing.
    pub fn build_pack(dir: &Path, entries: &[FixtureEntry<'_>]) -> Fixture {
        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());

        let mut ids = Vec::new();
        let mut offsets = Vec::new();
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut kinds: Vec<ObjectKind> = Vec::new();
        let mut index_entries = Vec::new();

        for fixture_entry in entries {
            let offset = pack.len() as u64;
            let raw_start = pack.len();

            let (kind, payload) = match fixture_entry {
                FixtureEntry::Plain(kind, payload) => {
                    pack.extend_from_slice(&encode_header(*kind as u8, payload.len() as u64));
                    pack.extend_from_slice(&deflate(payload));
                    (*kind, payload.to_vec())
                }
                FixtureEntry::OfsDelta(base_pos, target) => {
                    let script = crate::delta::build(&payloads[*base_pos], target);
                    pack.extend_from_slice(&encode_header(
                        crate::entry::PACK_TYPE_OFS_DELTA,
                        script.len() as u64,
                    ));
                    pack.extend_from_slice(&encode_ofs_delta_offset(
                        offset - offsets[*base_pos],
                    ));
                    pack.extend_from_slice(&deflate(&script));
                    (kinds[*base_pos], target.to_vec())
                }
                FixtureEntry::RefDelta(base_id, base_payload, target) => {
                    let script = crate::delta::build(base_payload, target);
                    pack.extend_from_slice(&encode_header(
                        crate::entry::PACK_TYPE_REF_DELTA,
                        script.len() as u64,
                    ));
                    pack.extend_from_slice(base_id.as_bytes());
                    pack.extend_from_slice(&deflate(&script));
                    (ObjectKind::Blob, target.to_vec())
                }
            };

            let id = Hasher::hash_object(kind.label(), &payload).unwrap();
            let crc = {
                let mut h = crc32fast::Hasher::new();
                h.update(&pack[raw_start..]);
                h.finalize()
            };
            index_entries.push((id, offset, crc));
            ids.push(id);
            offsets.push(offset);
            payloads.push(payload);
            kinds.push(kind);
        }

        let checksum = {
            let mut h = Hasher::new();
            h.update(&pack);
            h.finalize().unwrap()
        };
        pack.extend_from_slice(checksum.as_bytes());

        let pack_path = dir.join("test.pack");
        let idx_path = dir.join("test.idx");
        std::fs::write(&pack_path, &pack).unwrap();
        std::fs::write(&idx_path, build_index(&index_entries, checksum.as_bytes())).unwrap();

        Fixture {
            pack_path,
            idx_path,
            ids,
            offsets,
        }
    }
}
