use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;

use crate::{ObjectError, Signature};

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent commit ids (empty for a root commit).
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Commit message (everything after the blank separator line).
    pub message: BString,
}

impl Commit {
    /// Parse commit payload bytes (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;

        let mut pos = 0;
        loop {
            if pos >= content.len() {
                break;
            }
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space_pos) = line.find_byte(b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"tree" => tree = Some(parse_id(value, "tree")?),
                    b"parent" => parents.push(parse_id(value, "parent")?),
                    b"author" => author = Some(Signature::parse(BStr::new(value))?),
                    b"committer" => committer = Some(Signature::parse(BStr::new(value))?),
                    // gpgsig, mergetag and friends: skip, including any
                    // space-indented continuation lines.
                    _ => {
                        let mut next = line_end + 1;
                        while next < content.len() && content[next] == b' ' {
                            next += content[next..]
                                .find_byte(b'\n')
                                .map(|p| p + 1)
                                .unwrap_or(content.len() - next);
                        }
                        pos = next;
                        continue;
                    }
                }
            }
            pos = line_end + 1;
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        let committer =
            committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?;

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message: BString::from(&content[pos.min(content.len())..]),
        })
    }

    /// Serialise commit payload bytes (no object header).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');
        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }
}

fn parse_id(value: &[u8], field: &'static str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF8 {field} id")))?;
    Ok(ObjectId::from_hex(hex)?)
}
