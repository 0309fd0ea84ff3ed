//! Message kinds and payload codecs.
//!
//! Each kind is a discriminated-union variant; payloads are encoded with
//! explicit length checks so a malformed peer surfaces as `PrivsepLen`
//! rather than garbage data. Kind mismatches are `PrivsepMsg`.

use bstr::BString;
use grit_hash::{ObjectId, DIGEST_LEN};
use grit_object::{ObjectInfo, ObjectKind};

use crate::IpcError;

/// Wire discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgKind {
    Stop = 0,
    Error = 1,
    ObjectRequest = 10,
    Object = 11,
    RawObjectRequest = 12,
    RawObjectOutfd = 13,
    RawObject = 14,
    CommitRequest = 20,
    Commit = 21,
    GitconfigParseRequest = 30,
    GitconfigIntRequest = 31,
    GitconfigStrRequest = 32,
    GitconfigExtensionsRequest = 33,
    GitconfigInt = 34,
    GitconfigStr = 35,
    SendRequest = 40,
    SendRef = 41,
    SendRemoteRef = 42,
    SendPackRequest = 43,
    SendPackfd = 44,
    SendUploadProgress = 45,
    SendRefStatus = 46,
    SendDone = 47,
}

impl MsgKind {
    pub fn from_u32(v: u32) -> Result<Self, IpcError> {
        use MsgKind::*;
        Ok(match v {
            0 => Stop,
            1 => Error,
            10 => ObjectRequest,
            11 => Object,
            12 => RawObjectRequest,
            13 => RawObjectOutfd,
            14 => RawObject,
            20 => CommitRequest,
            21 => Commit,
            30 => GitconfigParseRequest,
            31 => GitconfigIntRequest,
            32 => GitconfigStrRequest,
            33 => GitconfigExtensionsRequest,
            34 => GitconfigInt,
            35 => GitconfigStr,
            40 => SendRequest,
            41 => SendRef,
            42 => SendRemoteRef,
            43 => SendPackRequest,
            44 => SendPackfd,
            45 => SendUploadProgress,
            46 => SendRefStatus,
            47 => SendDone,
            _ => return Err(IpcError::PrivsepMsg),
        })
    }
}

/// Gitconfig fields a parent can request from the read-gitconfig worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ConfigField {
    RepositoryFormatVersion = 0,
    AuthorName = 1,
    AuthorEmail = 2,
    Owner = 3,
}

impl ConfigField {
    fn from_u32(v: u32) -> Result<Self, IpcError> {
        Ok(match v {
            0 => Self::RepositoryFormatVersion,
            1 => Self::AuthorName,
            2 => Self::AuthorEmail,
            3 => Self::Owner,
            _ => return Err(IpcError::PrivsepMsg),
        })
    }
}

/// Structured commit fields returned by the read-commit worker.
///
/// Author and committer travel in their canonical header form
/// (`"Name <email> time tz"`); the worker did the untrusted parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: BString,
    pub committer: BString,
    pub message: BString,
}

/// A bus message. Variants marked "+fd" carry exactly one descriptor.
#[derive(Debug)]
pub enum Message {
    /// Graceful termination; honored by both sides.
    Stop,
    /// Fatal error report from a worker.
    Error { code: u32, msg: String },
    /// Decode the loose object on the attached fd. (+fd)
    ObjectRequest,
    Object(ObjectInfo),
    /// Decode the loose object on the attached fd, returning raw bytes. (+fd)
    RawObjectRequest,
    /// Destination for bulk raw data. (+fd)
    RawObjectOutfd,
    /// Raw object reply; `data` is inline for small objects, `None` when
    /// the payload went to the out fd.
    RawObject {
        size: u64,
        hdrlen: u64,
        data: Option<Vec<u8>>,
    },
    /// Decode the loose commit on the attached fd. (+fd)
    CommitRequest,
    Commit(CommitInfo),
    /// Parse the gitconfig on the attached fd. (+fd)
    GitconfigParseRequest,
    GitconfigIntRequest(ConfigField),
    GitconfigStrRequest(ConfigField),
    /// Request the extensions list: replied as Int(count), then Str × count.
    GitconfigExtensionsRequest,
    GitconfigInt(i64),
    GitconfigStr(Option<String>),
    /// Start a send operation on the attached wire fd. (+fd)
    SendRequest { verbosity: u32, nrefs: u32 },
    /// One ref to update or delete on the remote.
    SendRef {
        delete: bool,
        id: ObjectId,
        name: String,
    },
    /// A ref advertised by the remote.
    SendRemoteRef { id: ObjectId, name: String },
    /// Worker asks the parent for the pack file.
    SendPackRequest,
    /// Parent's reply: the pack file. (+fd)
    SendPackfd,
    /// Running total of pack bytes uploaded.
    SendUploadProgress { bytes: u64 },
    /// Per-ref acceptance from the remote's status report.
    SendRefStatus { success: bool, name: String },
    /// Send finished; the worker is done.
    SendDone,
}

impl Message {
    pub fn kind(&self) -> MsgKind {
        match self {
            Message::Stop => MsgKind::Stop,
            Message::Error { .. } => MsgKind::Error,
            Message::ObjectRequest => MsgKind::ObjectRequest,
            Message::Object(_) => MsgKind::Object,
            Message::RawObjectRequest => MsgKind::RawObjectRequest,
            Message::RawObjectOutfd => MsgKind::RawObjectOutfd,
            Message::RawObject { .. } => MsgKind::RawObject,
            Message::CommitRequest => MsgKind::CommitRequest,
            Message::Commit(_) => MsgKind::Commit,
            Message::GitconfigParseRequest => MsgKind::GitconfigParseRequest,
            Message::GitconfigIntRequest(_) => MsgKind::GitconfigIntRequest,
            Message::GitconfigStrRequest(_) => MsgKind::GitconfigStrRequest,
            Message::GitconfigExtensionsRequest => MsgKind::GitconfigExtensionsRequest,
            Message::GitconfigInt(_) => MsgKind::GitconfigInt,
            Message::GitconfigStr(_) => MsgKind::GitconfigStr,
            Message::SendRequest { .. } => MsgKind::SendRequest,
            Message::SendRef { .. } => MsgKind::SendRef,
            Message::SendRemoteRef { .. } => MsgKind::SendRemoteRef,
            Message::SendPackRequest => MsgKind::SendPackRequest,
            Message::SendPackfd => MsgKind::SendPackfd,
            Message::SendUploadProgress { .. } => MsgKind::SendUploadProgress,
            Message::SendRefStatus { .. } => MsgKind::SendRefStatus,
            Message::SendDone => MsgKind::SendDone,
        }
    }

    /// Encode the variant payload (without the envelope).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Stop
            | Message::ObjectRequest
            | Message::RawObjectRequest
            | Message::RawObjectOutfd
            | Message::CommitRequest
            | Message::GitconfigParseRequest
            | Message::GitconfigExtensionsRequest
            | Message::SendPackRequest
            | Message::SendPackfd
            | Message::SendDone => {}
            Message::Error { code, msg } => {
                out.extend_from_slice(&code.to_le_bytes());
                put_bytes(&mut out, msg.as_bytes());
            }
            Message::Object(info) => {
                out.push(info.kind as u8);
                out.extend_from_slice(&info.size.to_le_bytes());
                out.extend_from_slice(&(info.hdrlen as u64).to_le_bytes());
            }
            Message::RawObject { size, hdrlen, data } => {
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(&hdrlen.to_le_bytes());
                match data {
                    Some(bytes) => {
                        out.push(1);
                        out.extend_from_slice(bytes);
                    }
                    None => out.push(0),
                }
            }
            Message::Commit(info) => {
                out.extend_from_slice(info.tree.as_bytes());
                out.extend_from_slice(&(info.parents.len() as u32).to_le_bytes());
                for parent in &info.parents {
                    out.extend_from_slice(parent.as_bytes());
                }
                put_bytes(&mut out, &info.author);
                put_bytes(&mut out, &info.committer);
                put_bytes(&mut out, &info.message);
            }
            Message::GitconfigIntRequest(field) | Message::GitconfigStrRequest(field) => {
                out.extend_from_slice(&(*field as u32).to_le_bytes());
            }
            Message::GitconfigInt(value) => out.extend_from_slice(&value.to_le_bytes()),
            Message::GitconfigStr(value) => match value {
                Some(s) => {
                    out.push(1);
                    put_bytes(&mut out, s.as_bytes());
                }
                None => out.push(0),
            },
            Message::SendRequest { verbosity, nrefs } => {
                out.extend_from_slice(&verbosity.to_le_bytes());
                out.extend_from_slice(&nrefs.to_le_bytes());
            }
            Message::SendRef { delete, id, name } => {
                out.push(u8::from(*delete));
                out.extend_from_slice(id.as_bytes());
                put_bytes(&mut out, name.as_bytes());
            }
            Message::SendRemoteRef { id, name } => {
                out.extend_from_slice(id.as_bytes());
                put_bytes(&mut out, name.as_bytes());
            }
            Message::SendUploadProgress { bytes } => {
                out.extend_from_slice(&bytes.to_le_bytes());
            }
            Message::SendRefStatus { success, name } => {
                out.push(u8::from(*success));
                put_bytes(&mut out, name.as_bytes());
            }
        }
        out
    }

    /// Decode a variant payload for the given kind.
    pub fn decode_payload(kind: MsgKind, payload: &[u8]) -> Result<Self, IpcError> {
        let mut r = Reader::new(payload);
        let msg = match kind {
            MsgKind::Stop => Message::Stop,
            MsgKind::ObjectRequest => Message::ObjectRequest,
            MsgKind::RawObjectRequest => Message::RawObjectRequest,
            MsgKind::RawObjectOutfd => Message::RawObjectOutfd,
            MsgKind::CommitRequest => Message::CommitRequest,
            MsgKind::GitconfigParseRequest => Message::GitconfigParseRequest,
            MsgKind::GitconfigExtensionsRequest => Message::GitconfigExtensionsRequest,
            MsgKind::SendPackRequest => Message::SendPackRequest,
            MsgKind::SendPackfd => Message::SendPackfd,
            MsgKind::SendDone => Message::SendDone,
            MsgKind::Error => {
                let code = r.u32()?;
                let msg = String::from_utf8_lossy(r.bytes()?).into_owned();
                Message::Error { code, msg }
            }
            MsgKind::Object => {
                let kind = ObjectKind::from_pack_type(r.u8()?).ok_or(IpcError::PrivsepMsg)?;
                let size = r.u64()?;
                let hdrlen = r.u64()? as usize;
                Message::Object(ObjectInfo { kind, size, hdrlen })
            }
            MsgKind::RawObject => {
                let size = r.u64()?;
                let hdrlen = r.u64()?;
                let data = match r.u8()? {
                    0 => None,
                    1 => Some(r.rest().to_vec()),
                    _ => return Err(IpcError::PrivsepMsg),
                };
                Message::RawObject { size, hdrlen, data }
            }
            MsgKind::Commit => {
                let tree = r.id()?;
                let nparents = r.u32()?;
                // A commit cannot have more parents than the payload holds.
                if nparents as usize > payload.len() / DIGEST_LEN {
                    return Err(IpcError::PrivsepLen);
                }
                let mut parents = Vec::with_capacity(nparents as usize);
                for _ in 0..nparents {
                    parents.push(r.id()?);
                }
                let author = BString::from(r.bytes()?);
                let committer = BString::from(r.bytes()?);
                let message = BString::from(r.bytes()?);
                Message::Commit(CommitInfo {
                    tree,
                    parents,
                    author,
                    committer,
                    message,
                })
            }
            MsgKind::GitconfigIntRequest => {
                Message::GitconfigIntRequest(ConfigField::from_u32(r.u32()?)?)
            }
            MsgKind::GitconfigStrRequest => {
                Message::GitconfigStrRequest(ConfigField::from_u32(r.u32()?)?)
            }
            MsgKind::GitconfigInt => Message::GitconfigInt(r.u64()? as i64),
            MsgKind::GitconfigStr => {
                let value = match r.u8()? {
                    0 => None,
                    1 => Some(String::from_utf8_lossy(r.bytes()?).into_owned()),
                    _ => return Err(IpcError::PrivsepMsg),
                };
                Message::GitconfigStr(value)
            }
            MsgKind::SendRequest => Message::SendRequest {
                verbosity: r.u32()?,
                nrefs: r.u32()?,
            },
            MsgKind::SendRef => Message::SendRef {
                delete: r.u8()? != 0,
                id: r.id()?,
                name: String::from_utf8_lossy(r.bytes()?).into_owned(),
            },
            MsgKind::SendRemoteRef => Message::SendRemoteRef {
                id: r.id()?,
                name: String::from_utf8_lossy(r.bytes()?).into_owned(),
            },
            MsgKind::SendUploadProgress => Message::SendUploadProgress { bytes: r.u64()? },
            MsgKind::SendRefStatus => Message::SendRefStatus {
                success: r.u8()? != 0,
                name: String::from_utf8_lossy(r.bytes()?).into_owned(),
            },
        };
        if !matches!(msg, Message::RawObject { .. }) && !r.is_empty() {
            return Err(IpcError::PrivsepLen);
        }
        Ok(msg)
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IpcError> {
        if self.pos + n > self.data.len() {
            return Err(IpcError::PrivsepLen);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, IpcError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, IpcError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, IpcError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn id(&mut self) -> Result<ObjectId, IpcError> {
        ObjectId::from_bytes(self.take(DIGEST_LEN)?).map_err(|_| IpcError::PrivsepLen)
    }

    fn bytes(&mut self) -> Result<&'a [u8], IpcError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}
