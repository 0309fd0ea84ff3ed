use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;

use crate::{ObjectError, ObjectKind, Signature};

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Id of the tagged object.
    pub object: ObjectId,
    /// Kind of the tagged object.
    pub kind: ObjectKind,
    /// Tag name (without the `refs/tags/` prefix).
    pub name: BString,
    /// Tagger identity; some historical tags omit it.
    pub tagger: Option<Signature>,
    pub message: BString,
}

impl Tag {
    /// Parse tag payload bytes (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut object: Option<ObjectId> = None;
        let mut kind: Option<ObjectKind> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

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
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF8 object id".into())
                        })?;
                        object = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => kind = Some(ObjectKind::from_bytes(value)?),
                    b"tag" => name = Some(BString::from(value)),
                    b"tagger" => tagger = Some(Signature::parse(BStr::new(value))?),
                    _ => {}
                }
            }
            pos = line_end + 1;
        }

        let object = object.ok_or(ObjectError::MissingTagField { field: "object" })?;
        let kind = kind.ok_or(ObjectError::MissingTagField { field: "type" })?;
        let name = name.ok_or(ObjectError::MissingTagField { field: "tag" })?;

        Ok(Self {
            object,
            kind,
            name,
            tagger,
            message: BString::from(&content[pos.min(content.len())..]),
        })
    }

    /// Serialise tag payload bytes (no object header).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.object.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.kind.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}
