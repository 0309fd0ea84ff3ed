use std::cmp::Ordering;

use bstr::{BString, ByteSlice};
use grit_hash::{ObjectId, DIGEST_LEN};

use crate::ObjectError;

/// File mode for tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule link (160000)
    Gitlink,
    /// Subdirectory (040000)
    Tree,
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        match raw {
            0o100644 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o160000 => Ok(Self::Gitlink),
            0o040000 => Ok(Self::Tree),
            other => Err(ObjectError::InvalidFileMode(format!("{other:o}"))),
        }
    }

    /// Raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o40000,
        }
    }

    /// Canonical octal form (no leading zero for trees).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// A single tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub id: ObjectId,
}

impl TreeEntry {
    /// Git's tree entry ordering: after the common prefix, directory names
    /// compare as if they carried a trailing '/'.
    pub fn cmp_names(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        let (n1, n2): (&[u8], &[u8]) = (a.name.as_ref(), b.name.as_ref());
        let min_len = n1.len().min(n2.len());
        let cmp = n1[..min_len].cmp(&n2[..min_len]);
        if cmp != Ordering::Equal {
            return cmp;
        }
        let next = |name: &[u8], is_dir: bool| {
            if name.len() > min_len {
                name[min_len]
            } else if is_dir {
                b'/'
            } else {
                0
            }
        };
        next(n1, a.mode.is_tree()).cmp(&next(n2, b.mode.is_tree()))
    }
}

/// A tree object — a sorted directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree payload bytes. Each entry is
    /// `<mode-octal> <name>\0<20 raw id bytes>`.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .find_byte(b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;
            let mode = FileMode::from_bytes(&content[pos..space_pos]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "invalid mode".into(),
                }
            })?;

            let name_start = space_pos + 1;
            let null_pos = content[name_start..]
                .find_byte(0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing null after name".into(),
                })?
                + name_start;
            let name = BString::from(&content[name_start..null_pos]);
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "empty entry name".into(),
                });
            }

            let id_start = null_pos + 1;
            if id_start + DIGEST_LEN > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: id_start,
                    reason: "truncated id".into(),
                });
            }
            let id = ObjectId::from_bytes(&content[id_start..id_start + DIGEST_LEN])?;

            entries.push(TreeEntry { mode, name, id });
            pos = id_start + DIGEST_LEN;
        }

        Ok(Self { entries })
    }

    /// Serialise tree payload bytes. Entries are emitted in canonical order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| TreeEntry::cmp_names(a, b));

        let mut out = Vec::new();
        for entry in sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Look up an entry by name.
    pub fn find(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bytes() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
