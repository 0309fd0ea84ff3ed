//! Pack index (v2) reading and lookup.
//!
//! The index maps sorted object ids to pack offsets through a 256-entry
//! fanout table and binary search. Format:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Ids:     N × 20-byte sorted ids
//! CRC32:   N × 4-byte CRC32 of each packed representation
//! Offsets: N × 4-byte offsets (high bit set → index into 64-bit table)
//! 64-bit:  M × 8-byte offsets (packs over 2 GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use grit_hash::{ObjectId, DIGEST_LEN};
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

/// High bit of a 32-bit offset entry: value is a large-offset table index.
const OFFSET_IS_LARGE: u32 = 0x8000_0000;
const OFFSET_VALUE_MASK: u32 = 0x7fff_ffff;

/// An open, validated pack index.
pub struct PackIndex {
    data: Mmap,
    nobjects: u32,
    fanout_offset: usize,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    /// Number of entries in the large-offset table.
    nlarge: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and validate a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        // Minimum: header(8) + fanout(1024) + trailer(2 × 20)
        if data.len() < 8 + 1024 + 2 * DIGEST_LEN {
            return Err(PackError::BadPackIdx("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::BadPackIdx("bad signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::BadPackIdx(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout_offset = 8;
        let mut prev = 0u32;
        for i in 0..256 {
            let pos = fanout_offset + i * 4;
            let count = u32::from_be_bytes([
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ]);
            if count < prev {
                return Err(PackError::BadPackIdx(format!(
                    "fanout table not monotonic at byte {i:#04x}"
                )));
            }
            prev = count;
        }
        let nobjects = prev;

        let n = nobjects as usize;
        let oid_offset = fanout_offset + 1024;
        let crc_offset = oid_offset + n * DIGEST_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        // The large-offset table fills whatever lies between the 32-bit
        // offsets and the trailer.
        let trailer_len = 2 * DIGEST_LEN;
        let min_size = offset64_offset + trailer_len;
        if data.len() < min_size {
            return Err(PackError::BadPackIdx(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }
        let nlarge = (data.len() - trailer_len - offset64_offset) / 8;

        Ok(Self {
            data,
            nobjects,
            fanout_offset,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            nlarge,
            idx_path,
        })
    }

    /// Find the sorted position of an id, or `None` if absent.
    pub fn find_index(&self, id: &ObjectId) -> Option<u32> {
        let (lo, hi) = self.fanout_range(id.first_byte());
        let target: &[u8] = id.as_bytes();

        let mut low = lo;
        let mut high = hi;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid as u32),
            }
        }
        None
    }

    /// Pack offset of the entry at sorted position `i`.
    ///
    /// 32-bit values with the high bit clear are used directly (and are
    /// below 2^31); otherwise the masked value indexes the 64-bit table.
    pub fn offset_at(&self, i: u32) -> Result<u64, PackError> {
        let pos = self.offset32_offset + i as usize * 4;
        let val = u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]);

        if val & OFFSET_IS_LARGE == 0 {
            return Ok(u64::from(val));
        }

        let idx64 = (val & OFFSET_VALUE_MASK) as usize;
        if idx64 >= self.nlarge {
            return Err(PackError::BadPackIdx(format!(
                "large-offset index {idx64} out of range ({} entries)",
                self.nlarge
            )));
        }
        let pos64 = self.offset64_offset + idx64 * 8;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[pos64..pos64 + 8]);
        Ok(u64::from_be_bytes(bytes))
    }

    /// Id at sorted position `i`.
    pub fn oid_at(&self, i: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(i as usize)).expect("index id has digest length")
    }

    /// CRC32 of the packed representation at sorted position `i`.
    pub fn crc32_at(&self, i: u32) -> u32 {
        let pos = self.crc_offset + i as usize * 4;
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    /// Collect every id whose hex form starts with `prefix`.
    ///
    /// The scan is bounded by the fanout range of the prefix's first byte;
    /// callers deduplicate across pack files. A prefix shorter than two hex
    /// digits spans fanout buckets and yields nothing here.
    pub fn match_prefix(&self, prefix: &str) -> Vec<ObjectId> {
        let mut matched = Vec::new();
        if prefix.len() < 2 {
            return matched;
        }
        let Ok(first) = u8::from_str_radix(&prefix[..2], 16) else {
            return matched;
        };

        let (lo, hi) = self.fanout_range(first);
        for i in lo..hi {
            let id = self.oid_at(i as u32);
            if id.starts_with_hex(prefix) {
                matched.push(id);
            }
        }
        matched
    }

    /// Total number of objects (`fanout[255]`).
    pub fn nobjects(&self) -> u32 {
        self.nobjects
    }

    /// Path this index was opened from; the cache key.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Pack checksum from the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * DIGEST_LEN;
        ObjectId::from_bytes(&self.data[start..start + DIGEST_LEN])
            .expect("trailer has digest length")
    }

    /// Index checksum from the trailer.
    pub fn index_checksum(&self) -> ObjectId {
        let start = self.data.len() - DIGEST_LEN;
        ObjectId::from_bytes(&self.data[start..]).expect("trailer has digest length")
    }

    /// Iterate over all ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.nobjects).map(|i| self.oid_at(i))
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = self.fanout_entry(first_byte) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fanout_entry(first_byte - 1) as usize
        };
        (start, end)
    }

    fn fanout_entry(&self, index: u8) -> u32 {
        let pos = self.fanout_offset + index as usize * 4;
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.oid_offset + index * DIGEST_LEN;
        &self.data[start..start + DIGEST_LEN]
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use grit_hash::Hasher;

    /// Build a synthetic v2 index in memory. Entries are (id, offset, crc);
    /// offsets at or above 2^31 land in the large-offset table.
    pub fn build_index(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8; 20]) -> Vec<u8> {
        let mut sorted: Vec<_> = entries.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        let mut fanout = [0u32; 256];
        for (id, _, _) in &sorted {
            fanout[id.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }

        for (id, _, _) in &sorted {
            buf.extend_from_slice(id.as_bytes());
        }
        for (_, _, crc) in &sorted {
            buf.extend_from_slice(&crc.to_be_bytes());
        }

        let mut large = Vec::new();
        for (_, offset, _) in &sorted {
            if *offset < (1 << 31) {
                buf.extend_from_slice(&(*offset as u32).to_be_bytes());
            } else {
                let slot = 0x8000_0000u32 | large.len() as u32;
                buf.extend_from_slice(&slot.to_be_bytes());
                large.push(*offset);
            }
        }
        for offset in large {
            buf.extend_from_slice(&offset.to_be_bytes());
        }

        buf.extend_from_slice(pack_checksum);
        let idx_checksum = {
            let mut h = Hasher::new();
            h.update(&buf);
            h.finalize().unwrap()
        };
        buf.extend_from_slice(idx_checksum.as_bytes());
        buf
    }

    pub fn make_oid(first: u8, last: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = first;
        bytes[19] = last;
        ObjectId::from_bytes(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{build_index, make_oid};
    use super::*;

    fn write_index(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("test.idx");
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn open_and_find_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let oid = make_oid(0xab, 0x01);
        let data = build_index(&[(oid, 12, 0xdeadbeef)], &[0; 20]);
        let path = write_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.nobjects(), 1);
        assert_eq!(idx.find_index(&oid), Some(0));
        assert_eq!(idx.offset_at(0).unwrap(), 12);
        assert_eq!(idx.crc32_at(0), 0xdeadbeef);
        assert_eq!(idx.find_index(&make_oid(0xab, 0x02)), None);
    }

    #[test]
    fn binary_search_matches_linear_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = Vec::new();
        for first in [0x00u8, 0x00, 0x17, 0x17, 0x17, 0x80, 0xfe, 0xff] {
            let last = entries.len() as u8;
            entries.push((make_oid(first, last), 100 + last as u64, 0));
        }
        let data = build_index(&entries, &[0; 20]);
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();

        let all: Vec<ObjectId> = idx.iter().collect();
        for (id, _, _) in &entries {
            let linear = all.iter().position(|x| x == id).unwrap() as u32;
            assert_eq!(idx.find_index(id), Some(linear));
        }
        // And ids not present are not found.
        assert_eq!(idx.find_index(&make_oid(0x17, 0xcc)), None);
        assert_eq!(idx.find_index(&make_oid(0x42, 0x00)), None);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let good = build_index(&[], &[0; 20]);

        let mut bad_magic = good.clone();
        bad_magic[0] = b'x';
        let path = write_index(dir.path(), &bad_magic);
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::BadPackIdx(_))
        ));

        let mut bad_version = good;
        bad_version[7] = 1; // v1 indexes are refused
        let path = write_index(dir.path(), &bad_version);
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::BadPackIdx(_))
        ));
    }

    #[test]
    fn rejects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_index(&[(make_oid(0x10, 1), 50, 0)], &[0; 20]);
        let path = write_index(dir.path(), &data[..data.len() - 25]);
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::BadPackIdx(_))
        ));
    }

    #[test]
    fn rejects_non_monotonic_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = build_index(&[(make_oid(0x10, 1), 50, 0)], &[0; 20]);
        // Bump an early fanout bucket above the final count.
        let pos = 8 + 4 * 4;
        data[pos..pos + 4].copy_from_slice(&9u32.to_be_bytes());
        let path = write_index(dir.path(), &data);
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::BadPackIdx(_))
        ));
    }

    #[test]
    fn large_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let oid = make_oid(0x42, 0x01);
        let big = 5u64 * 1024 * 1024 * 1024;
        let data = build_index(&[(oid, big, 0)], &[0; 20]);
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();

        let i = idx.find_index(&oid).unwrap();
        assert_eq!(idx.offset_at(i).unwrap(), big);
    }

    #[test]
    fn large_offset_index_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let oid = make_oid(0x42, 0x01);
        let mut data = build_index(&[(oid, 100, 0)], &[0; 20]);
        // Point the 32-bit slot at large-offset entry 3 of an empty table.
        let offset32_pos = 8 + 1024 + 20 + 4;
        data[offset32_pos..offset32_pos + 4]
            .copy_from_slice(&(0x8000_0000u32 | 3).to_be_bytes());
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();
        assert!(matches!(
            idx.offset_at(0),
            Err(PackError::BadPackIdx(_))
        ));
    }

    #[test]
    fn prefix_matching() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xab, 0x01), 100, 0),
            (make_oid(0xab, 0x02), 200, 0),
            (make_oid(0xac, 0x01), 300, 0),
        ];
        let data = build_index(&entries, &[0; 20]);
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();

        assert_eq!(idx.match_prefix("ab").len(), 2);
        assert_eq!(idx.match_prefix("ac").len(), 1);
        assert_eq!(idx.match_prefix("ad").len(), 0);
        // Full hex matches exactly one.
        let full = make_oid(0xab, 0x01).to_hex();
        assert_eq!(idx.match_prefix(&full), vec![make_oid(0xab, 0x01)]);
    }

    #[test]
    fn empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_index(&[], &[0; 20]);
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();
        assert_eq!(idx.nobjects(), 0);
        assert_eq!(idx.find_index(&make_oid(0, 0)), None);
        assert_eq!(idx.iter().count(), 0);
    }

    #[test]
    fn trailer_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let pack_sum = [0x11u8; 20];
        let data = build_index(&[(make_oid(1, 1), 5, 0)], &pack_sum);
        let idx = PackIndex::open(write_index(dir.path(), &data)).unwrap();
        assert_eq!(idx.pack_checksum().as_bytes(), &pack_sum);
        // The index checksum covers everything before itself.
        let expected = grit_hash::Hasher::digest(&data[..data.len() - 20]).unwrap();
        assert_eq!(idx.index_checksum(), expected);
    }
}
