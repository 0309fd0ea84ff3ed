//! Object lookup: caches first, then packs, then loose storage.
//!
//! Packed extraction runs in-process; decoding of loose objects — the
//! inflate of fully untrusted bytes and commit parsing — is delegated to
//! the read-object / read-commit workers. Cache-insert hints (`Exists`,
//! `TooLarge`) are swallowed here: they are not failures.

use std::collections::HashMap;
use std::sync::Arc;

use grit_hash::ObjectId;
use grit_object::{header, Commit, ObjectInfo, ObjectKind, RawData, RawObject, Tag, Tree};
use grit_pack::PackError;

use crate::{RepoError, Repository};

impl Repository {
    /// The kind of the object with this id.
    ///
    /// Loose objects are answered from a bounded header sniff; packed
    /// objects from entry headers alone (no payload inflation).
    pub fn object_kind(&mut self, id: &ObjectId) -> Result<ObjectKind, RepoError> {
        if let Some(info) = self.caches.objects.get(id) {
            return Ok(info.kind);
        }
        if let Some(info) = self.loose().read_info(id)? {
            let _ = self.caches.objects.insert(*id, Arc::new(info));
            return Ok(info.kind);
        }
        match self.packed_kind(id)? {
            Some(kind) => Ok(kind),
            None => Err(RepoError::NoObj(id.to_hex())),
        }
    }

    /// Header-level object info (kind, size, header length).
    pub fn open_object(&mut self, id: &ObjectId) -> Result<Arc<ObjectInfo>, RepoError> {
        if let Some(info) = self.caches.objects.get(id) {
            return Ok(info);
        }
        let info = if let Some(file) = self.loose().open_fd(id)? {
            self.object_info_via_worker(file)?
        } else {
            let (kind, payload) = self
                .packed_payload(id)?
                .ok_or_else(|| RepoError::NoObj(id.to_hex()))?;
            ObjectInfo {
                kind,
                size: payload.len() as u64,
                hdrlen: header::encode(kind, payload.len() as u64).len(),
            }
        };
        let info = Arc::new(info);
        let _ = self.caches.objects.insert(*id, Arc::clone(&info));
        Ok(info)
    }

    /// Open a commit, via the read-commit worker for loose storage.
    pub fn open_commit(&mut self, id: &ObjectId) -> Result<Arc<Commit>, RepoError> {
        if let Some(commit) = self.caches.commits.get(id) {
            return Ok(commit);
        }
        let commit = if let Some(file) = self.loose().open_fd(id)? {
            self.commit_via_worker(file)?
        } else {
            let (kind, payload) = self
                .packed_payload(id)?
                .ok_or_else(|| RepoError::NoObj(format!("commit {}", id.to_hex())))?;
            if kind != ObjectKind::Commit {
                return Err(RepoError::NoObj(format!("commit {}", id.to_hex())));
            }
            Commit::parse(&payload)?
        };
        let commit = Arc::new(commit);
        let _ = self.caches.commits.insert(*id, Arc::clone(&commit));
        Ok(commit)
    }

    /// Open a tree.
    pub fn open_tree(&mut self, id: &ObjectId) -> Result<Arc<Tree>, RepoError> {
        if let Some(tree) = self.caches.trees.get(id) {
            return Ok(tree);
        }
        let (kind, payload) = self.object_payload(id)?;
        if kind != ObjectKind::Tree {
            return Err(RepoError::NoObj(format!("tree {}", id.to_hex())));
        }
        let tree = Arc::new(Tree::parse(&payload)?);
        let _ = self.caches.trees.insert(*id, Arc::clone(&tree));
        Ok(tree)
    }

    /// Open an annotated tag.
    pub fn open_tag(&mut self, id: &ObjectId) -> Result<Arc<Tag>, RepoError> {
        if let Some(tag) = self.caches.tags.get(id) {
            return Ok(tag);
        }
        let (kind, payload) = self.object_payload(id)?;
        if kind != ObjectKind::Tag {
            return Err(RepoError::NoObj(format!("tag {}", id.to_hex())));
        }
        let tag = Arc::new(Tag::parse(&payload)?);
        let _ = self.caches.tags.insert(*id, Arc::clone(&tag));
        Ok(tag)
    }

    /// Open the raw (header + payload) form of an object.
    ///
    /// Loose objects go through the read-object worker, which returns
    /// small payloads inline and writes bulk data to a parent-supplied
    /// file. Oversized results are simply not cached.
    pub fn open_raw(&mut self, id: &ObjectId) -> Result<Arc<RawObject>, RepoError> {
        if let Some(raw) = self.caches.raw.get(id) {
            return Ok(raw);
        }
        let raw = if let Some(file) = self.loose().open_fd(id)? {
            self.raw_via_worker(file)?
        } else {
            let (kind, payload) = self
                .packed_payload(id)?
                .ok_or_else(|| RepoError::NoObj(id.to_hex()))?;
            let mut full = header::encode(kind, payload.len() as u64);
            let hdrlen = full.len();
            full.extend_from_slice(&payload);
            RawObject {
                info: ObjectInfo {
                    kind,
                    size: payload.len() as u64,
                    hdrlen,
                },
                data: RawData::Inline(full),
            }
        };
        let weight = raw.total_len();
        let raw = Arc::new(raw);
        let _ = self
            .caches
            .raw
            .insert_weighted(*id, Arc::clone(&raw), weight);
        Ok(raw)
    }

    /// Full payload of an object from whichever store holds it.
    pub fn object_payload(&mut self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), RepoError> {
        if let Some((info, payload)) = self.loose().read(id)? {
            return Ok((info.kind, payload));
        }
        self.packed_payload(id)?
            .ok_or_else(|| RepoError::NoObj(id.to_hex()))
    }

    /// Extract an object from the pack store.
    ///
    /// REF_DELTA bases that live outside the holding pack are gathered
    /// through repeated full lookups and fed back into extraction.
    pub(crate) fn packed_payload(
        &mut self,
        id: &ObjectId,
    ) -> Result<Option<(ObjectKind, Vec<u8>)>, RepoError> {
        let mut extra_bases: HashMap<ObjectId, (ObjectKind, Vec<u8>)> = HashMap::new();
        loop {
            let Some((idx_slot, pos)) = self.search_packidx(id)? else {
                return Ok(None);
            };
            let pack_slot = self.ensure_pack(idx_slot)?;
            let offset = self.packidx_at(idx_slot).offset_at(pos)?;

            let loose = self.loose();
            let idx = self.packidx_at(idx_slot);
            let pack = self.pack_at(pack_slot);
            let result = pack.extract(offset, idx, |base_id| {
                if let Some(base) = extra_bases.get(base_id) {
                    return Some(base.clone());
                }
                loose
                    .read(base_id)
                    .ok()
                    .flatten()
                    .map(|(info, payload)| (info.kind, payload))
            });

            match result {
                Ok(found) => return Ok(Some(found)),
                Err(PackError::MissingBase(base_id)) => {
                    if extra_bases.contains_key(&base_id) {
                        return Err(PackError::MissingBase(base_id).into());
                    }
                    let base = self.object_payload(&base_id)?;
                    extra_bases.insert(base_id, base);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Kind of a packed object, from entry headers alone.
    fn packed_kind(&mut self, id: &ObjectId) -> Result<Option<ObjectKind>, RepoError> {
        let Some((idx_slot, pos)) = self.search_packidx(id)? else {
            return Ok(None);
        };
        let pack_slot = self.ensure_pack(idx_slot)?;
        let offset = self.packidx_at(idx_slot).offset_at(pos)?;

        let loose = self.loose();
        let idx = self.packidx_at(idx_slot);
        let pack = self.pack_at(pack_slot);
        match pack.kind_at(offset, idx, |base_id| {
            loose.read_info(base_id).ok().flatten().map(|info| info.kind)
        }) {
            Ok(kind) => Ok(Some(kind)),
            // The delta's base (and thus its kind) lives in another pack.
            Err(PackError::MissingBase(base_id)) => Ok(Some(self.object_kind(&base_id)?)),
            Err(e) => Err(e.into()),
        }
    }
}
