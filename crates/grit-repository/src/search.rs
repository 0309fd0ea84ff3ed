//! Pack-index and pack-file cache management.
//!
//! Both caches are small vectors with most-recently-used entries at the
//! front. The index cache promotes on hit (repeatedly probing the wrong
//! index is expensive); the pack cache orders on insert only. Per-index
//! Bloom filters short-circuit lookups that cannot match, and are built
//! lazily the first time an index is opened.

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_pack::{Bloom, Pack, PackIndex, BLOOM_MAX_OBJECTS};

use crate::{RepoError, Repository};

/// Cache instrumentation: how often the Bloom filters were consulted and
/// how many index searches actually ran.
#[derive(Debug, Default, Clone)]
pub struct SearchStats {
    pub bloom_checks: u64,
    pub bloom_skips: u64,
    pub idx_searches: u64,
}

/// Enumerate `objects/pack/*.idx` with the canonical name shape
/// (`pack-<40 hex>.idx`). A missing pack directory yields no paths.
pub(crate) fn list_packidx_paths(git_dir: &Path) -> Result<Vec<PathBuf>, RepoError> {
    let pack_dir = git_dir.join("objects").join("pack");
    let entries = match std::fs::read_dir(&pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RepoError::Io(e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_packidx_filename(name) {
            paths.push(pack_dir.join(name));
        }
    }
    paths.sort();
    Ok(paths)
}

/// `pack-<40 hex>.idx`?
pub(crate) fn is_packidx_filename(name: &str) -> bool {
    name.len() == "pack-".len() + 40 + ".idx".len()
        && name.starts_with("pack-")
        && name.ends_with(".idx")
        && name["pack-".len()..name.len() - ".idx".len()]
            .bytes()
            .all(|b| b.is_ascii_hexdigit())
}

impl Repository {
    /// Locate the pack index containing `id`.
    ///
    /// Returns the cache slot of the index and the object's position in
    /// it, or `None` when no index holds the id. Cached indexes are
    /// probed first (hits are promoted to the front); then any on-disk
    /// index not yet cached is opened, given a Bloom filter, and cached
    /// at the back, evicting the oldest entry when full.
    pub fn search_packidx(
        &mut self,
        id: &ObjectId,
    ) -> Result<Option<(usize, u32)>, RepoError> {
        // Pass 1: the in-memory cache.
        for slot in 0..self.packidx_cache.len() {
            if !self.check_bloom(self.packidx_cache[slot].path().to_path_buf(), id) {
                continue;
            }
            self.stats.idx_searches += 1;
            if let Some(pos) = self.packidx_cache[slot].find_index(id) {
                // Move to the front; repeatedly searching a wrong pack
                // index first is expensive.
                let hit = self.packidx_cache.remove(slot);
                self.packidx_cache.insert(0, hit);
                return Ok(Some((0, pos)));
            }
        }

        // Pass 2: indexes on disk that are not cached yet.
        let disk_paths: Vec<PathBuf> = self
            .packidx_paths
            .iter()
            .filter(|path| {
                !self
                    .packidx_cache
                    .iter()
                    .any(|idx| idx.path() == path.as_path())
            })
            .cloned()
            .collect();

        for path in disk_paths {
            if !self.check_bloom(path.clone(), id) {
                continue;
            }
            let idx = PackIndex::open(&path)?;
            self.add_bloom(&idx);
            let slot = self.cache_packidx(idx)?;
            self.stats.idx_searches += 1;
            if let Some(pos) = self.packidx_cache[slot].find_index(id) {
                return Ok(Some((slot, pos)));
            }
        }

        Ok(None)
    }

    /// Probe the Bloom filter for a pack index path. `true` means the
    /// index must be searched (a filter may not exist yet).
    fn check_bloom(&mut self, idx_path: PathBuf, id: &ObjectId) -> bool {
        match self.bloom_filters.get(&idx_path) {
            Some(bloom) => {
                self.stats.bloom_checks += 1;
                if bloom.check(id.as_bytes()) {
                    true
                } else {
                    self.stats.bloom_skips += 1;
                    false
                }
            }
            None => true,
        }
    }

    /// Build and register a Bloom filter over an index's ids.
    ///
    /// Skipped for very large indexes: those packs hold a big share of
    /// the repository's objects, so the filter would mostly answer
    /// "maybe" while a full id sweep is expensive to take.
    fn add_bloom(&mut self, idx: &PackIndex) {
        if idx.nobjects() > BLOOM_MAX_OBJECTS {
            return;
        }
        if self.bloom_filters.contains_key(idx.path()) {
            return;
        }
        let mut bloom = Bloom::with_rate(idx.nobjects().max(1000) as usize, 0.1);
        for id in idx.iter() {
            bloom.insert(id.as_bytes());
        }
        self.bloom_filters.insert(idx.path().to_path_buf(), bloom);
    }

    /// Insert an opened index at the back of the cache, evicting the
    /// oldest entry when full. A duplicate path is a caller bug.
    fn cache_packidx(&mut self, idx: PackIndex) -> Result<usize, RepoError> {
        if self
            .packidx_cache
            .iter()
            .any(|cached| cached.path() == idx.path())
        {
            return Err(RepoError::CacheDupEntry(idx.path().to_path_buf()));
        }
        if self.packidx_cache.len() == self.pack_cache_size {
            self.packidx_cache.pop();
        }
        self.packidx_cache.push(idx);
        Ok(self.packidx_cache.len() - 1)
    }

    pub(crate) fn packidx_at(&self, slot: usize) -> &PackIndex {
        &self.packidx_cache[slot]
    }

    /// Slot of an already-open pack, if any. No promotion on lookup.
    pub(crate) fn cached_pack(&self, pack_path: &Path) -> Option<usize> {
        self.pack_cache
            .iter()
            .position(|pack| pack.path() == pack_path)
    }

    /// Open a pack and insert it at the front of the pack cache, evicting
    /// the oldest pack (closing its fd and mapping) when full.
    pub(crate) fn cache_pack(
        &mut self,
        pack_path: &Path,
        idx_slot: usize,
    ) -> Result<usize, RepoError> {
        if self.cached_pack(pack_path).is_some() {
            return Err(RepoError::CacheDupEntry(pack_path.to_path_buf()));
        }
        let pack = Pack::open(pack_path, &self.packidx_cache[idx_slot])?;
        if self.pack_cache.len() == self.pack_cache_size {
            self.pack_cache.pop();
        }
        self.pack_cache.insert(0, pack);
        Ok(0)
    }

    /// Slot of the open pack belonging to the index in `idx_slot`,
    /// opening and caching the pack if needed.
    pub(crate) fn ensure_pack(&mut self, idx_slot: usize) -> Result<usize, RepoError> {
        let pack_path = packfile_path(self.packidx_cache[idx_slot].path());
        match self.cached_pack(&pack_path) {
            Some(slot) => Ok(slot),
            None => self.cache_pack(&pack_path, idx_slot),
        }
    }

    pub(crate) fn pack_at(&self, slot: usize) -> &Pack {
        &self.pack_cache[slot]
    }
}

/// Derive the `.pack` path from an `.idx` path.
pub(crate) fn packfile_path(idx_path: &Path) -> PathBuf {
    idx_path.with_extension("pack")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::init_bare;

    #[test]
    fn packidx_filename_shape() {
        let hex40 = "0123456789abcdef0123456789abcdef01234567";
        assert!(is_packidx_filename(&format!("pack-{hex40}.idx")));
        assert!(!is_packidx_filename(&format!("pack-{hex40}.pack")));
        assert!(!is_packidx_filename("pack-1234.idx"));
        assert!(!is_packidx_filename(&format!(
            "pack-{}.idx",
            "z".repeat(40)
        )));
        assert!(!is_packidx_filename(&format!("idx-{hex40}.idx")));
    }

    #[test]
    fn empty_repo_has_no_packidx_paths() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_bare(dir.path());
        assert!(repo.packidx_paths().is_empty());
    }

    #[test]
    fn missing_pack_dir_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("objects")).unwrap();
        std::fs::create_dir(dir.path().join("refs")).unwrap();
        std::fs::write(dir.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        let repo = crate::Repository::open(dir.path(), None).unwrap();
        assert!(repo.packidx_paths().is_empty());
    }

    #[test]
    fn search_miss_on_empty_repo() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = init_bare(dir.path());
        let id = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(repo.search_packidx(&id).unwrap().is_none());
    }

    // Pack-backed search behavior (promotion, Bloom short-circuit) is
    // covered in objects.rs tests where pack fixtures are available.
}
