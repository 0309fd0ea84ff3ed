//! Object id resolution: prefixes, tag names, and reference names.

use grit_hash::{ObjectId, HEX_LEN};
use grit_object::ObjectKind;
use grit_pack::PackIndex;

use crate::{RepoError, Repository};

/// A resolved reference, as supplied by the caller for tag matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: String,
    pub id: ObjectId,
}

/// A reference opened through the external reference store.
#[derive(Debug, Clone)]
pub struct OpenedRef {
    name: String,
}

impl OpenedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The on-disk reference store is an external collaborator; this is the
/// seam the resolver needs from it.
pub trait RefStore {
    /// Open a reference by name, yielding its canonical name.
    fn ref_open(&self, name: &str) -> Result<OpenedRef, RepoError>;

    /// Resolve an opened reference to the object it points at.
    fn ref_resolve(&self, reference: &OpenedRef) -> Result<ObjectId, RepoError>;
}

impl Repository {
    /// Resolve an id prefix to the unique matching object id.
    ///
    /// Searches every pack index, then the loose fanout directory.
    /// Distinct matches are `AmbiguousId`; the same id found several
    /// times (packed twice, or packed and loose) is fine. With a `kind`,
    /// non-matching objects are ignored.
    pub fn match_object_id_prefix(
        &mut self,
        prefix: &str,
        kind: Option<ObjectKind>,
    ) -> Result<ObjectId, RepoError> {
        if prefix.is_empty()
            || prefix.len() > HEX_LEN
            || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(RepoError::BadObjIdStr(prefix.to_string()));
        }
        let prefix = prefix.to_ascii_lowercase();

        let mut unique: Option<ObjectId> = None;
        if prefix.len() >= 2 {
            self.match_packed(&prefix, kind, &mut unique)?;
            self.match_loose(&prefix[..2], &prefix, kind, &mut unique)?;
        } else {
            // One hex digit: expand over all 16 second nibbles.
            for nibble in 0..16u8 {
                let object_dir = format!("{prefix}{nibble:x}");
                self.match_packed(&object_dir, kind, &mut unique)?;
                self.match_loose(&object_dir, &prefix, kind, &mut unique)?;
            }
        }

        unique.ok_or_else(|| match kind {
            Some(kind) => RepoError::NoObj(format!("{} {prefix}", kind.label())),
            None => RepoError::NoObj(prefix.clone()),
        })
    }

    /// Collect packed candidates for a prefix of at least two digits.
    fn match_packed(
        &mut self,
        prefix: &str,
        kind: Option<ObjectKind>,
        unique: &mut Option<ObjectId>,
    ) -> Result<(), RepoError> {
        // Indexes are opened fresh rather than through the cache: a
        // prefix sweep touches every index and would churn the MRU order.
        let paths = self.packidx_paths.clone();
        for path in paths {
            let idx = PackIndex::open(&path)?;
            for candidate in idx.match_prefix(prefix) {
                self.consider(candidate, kind, unique, prefix)?;
            }
        }
        Ok(())
    }

    /// Collect loose candidates from one fanout directory.
    fn match_loose(
        &mut self,
        object_dir: &str,
        prefix: &str,
        kind: Option<ObjectKind>,
        unique: &mut Option<ObjectId>,
    ) -> Result<(), RepoError> {
        let ids = self.loose().scan_fanout_dir(object_dir)?;
        for candidate in ids {
            if !candidate.starts_with_hex(prefix) {
                continue;
            }
            self.consider(candidate, kind, unique, prefix)?;
        }
        Ok(())
    }

    fn consider(
        &mut self,
        candidate: ObjectId,
        kind: Option<ObjectKind>,
        unique: &mut Option<ObjectId>,
        prefix: &str,
    ) -> Result<(), RepoError> {
        if let Some(wanted) = kind {
            if self.object_kind(&candidate)? != wanted {
                return Ok(());
            }
        }
        match unique {
            None => *unique = Some(candidate),
            Some(existing) if *existing == candidate => {}
            Some(_) => return Err(RepoError::AmbiguousId(prefix.to_string())),
        }
        Ok(())
    }

    /// Resolve a user-supplied name to an object id and a display label.
    ///
    /// Tag names from `refs` win first (including peeled target kind
    /// checks); then id prefixes; a string that is not hex at all falls
    /// back to the reference store.
    pub fn match_object_id(
        &mut self,
        name: &str,
        kind: Option<ObjectKind>,
        refs: &[ResolvedRef],
        refstore: &dyn RefStore,
    ) -> Result<(ObjectId, String), RepoError> {
        if !refs.is_empty() {
            if let Some((target, tag_name)) = self.match_tag(name, kind, refs)? {
                return Ok((target, format!("refs/tags/{tag_name}")));
            }
        }

        match self.match_object_id_prefix(name, kind) {
            Ok(id) => Ok((id, id.to_hex())),
            Err(RepoError::BadObjIdStr(_)) => {
                let opened = refstore.ref_open(name)?;
                let id = refstore.ref_resolve(&opened)?;
                Ok((id, opened.name().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Find an annotated tag named `name` whose target has the wanted
    /// kind. Returns the tag's target id and the tag's short name.
    fn match_tag(
        &mut self,
        name: &str,
        kind: Option<ObjectKind>,
        refs: &[ResolvedRef],
    ) -> Result<Option<(ObjectId, String)>, RepoError> {
        let name_is_absolute = name.starts_with("refs/");
        for reference in refs {
            let Some(short) = reference.name.strip_prefix("refs/tags/") else {
                continue;
            };
            let matches = if name_is_absolute {
                reference.name == name
            } else {
                short == name
            };
            if !matches {
                continue;
            }
            // Lightweight tags point straight at the target object;
            // only annotated tags are considered here.
            if self.object_kind(&reference.id)? != ObjectKind::Tag {
                continue;
            }
            let tag = self.open_tag(&reference.id)?;
            if kind.is_none() || kind == Some(tag.kind) {
                return Ok(Some((tag.object, short.to_string())));
            }
        }
        Ok(None)
    }
}
