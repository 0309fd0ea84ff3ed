//! The repository's privsep child table.
//!
//! Workers are spawned lazily, one per kind, and reused across requests;
//! `close` stops them all. Binaries are resolved from the libexec
//! directory — by default the directory holding the current executable,
//! overridable via the `GRIT_LIBEXEC` environment variable or
//! [`Repository::set_libexec_dir`].

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::fd::AsFd;
use std::path::PathBuf;

use bstr::BStr;
use grit_ipc::{
    spawn_worker, Bus, IpcError, Message, MsgKind, WorkerHandle,
};
use grit_object::{Commit, ObjectInfo, RawData, RawObject, Signature};

use crate::{RepoError, Repository};

/// The worker kinds the repository can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    ReadObject,
    ReadCommit,
    ReadGitconfig,
    SendPack,
}

impl WorkerKind {
    pub fn program(&self) -> &'static str {
        match self {
            Self::ReadObject => "grit-read-object",
            Self::ReadCommit => "grit-read-commit",
            Self::ReadGitconfig => "grit-read-gitconfig",
            Self::SendPack => "grit-send-pack",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Self::ReadObject => 0,
            Self::ReadCommit => 1,
            Self::ReadGitconfig => 2,
            Self::SendPack => 3,
        }
    }
}

const NSLOTS: usize = 4;

pub(crate) struct PrivsepChildren {
    libexec_dir: Option<PathBuf>,
    slots: [Option<WorkerHandle>; NSLOTS],
}

impl PrivsepChildren {
    pub(crate) fn new() -> Self {
        Self {
            libexec_dir: None,
            slots: [None, None, None, None],
        }
    }

    pub(crate) fn set_libexec_dir(&mut self, dir: PathBuf) {
        self.libexec_dir = Some(dir);
    }

    pub(crate) fn program_path(&self, kind: WorkerKind) -> PathBuf {
        let dir = self
            .libexec_dir
            .clone()
            .or_else(|| std::env::var_os("GRIT_LIBEXEC").map(PathBuf::from))
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            })
            .unwrap_or_default();
        dir.join(kind.program())
    }

    /// The bus of the worker for `kind`, spawning it on first use.
    pub(crate) fn bus(&mut self, kind: WorkerKind) -> Result<&mut Bus, IpcError> {
        let slot = kind.slot();
        if self.slots[slot].is_none() {
            let handle = spawn_worker(&self.program_path(kind), &[])?;
            self.slots[slot] = Some(handle);
        }
        Ok(&mut self.slots[slot].as_mut().expect("just spawned").bus)
    }

    /// Stop every running worker, reporting the first error.
    pub(crate) fn stop_all(&mut self) -> Result<(), IpcError> {
        let mut first_err = None;
        for slot in &mut self.slots {
            if let Some(handle) = slot.take() {
                if let Err(e) = handle.stop() {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Repository {
    /// Ask the read-object worker for the header info of the deflated
    /// loose object on `file`.
    pub(crate) fn object_info_via_worker(&mut self, file: File) -> Result<ObjectInfo, RepoError> {
        let bus = self.privsep.bus(WorkerKind::ReadObject)?;
        bus.send_with_fd(&Message::ObjectRequest, file.as_fd())?;
        match bus.recv_expect(MsgKind::Object)? {
            (Message::Object(info), _) => Ok(info),
            _ => Err(IpcError::PrivsepMsg.into()),
        }
    }

    /// Ask the read-commit worker to decode the loose commit on `file`.
    pub(crate) fn commit_via_worker(&mut self, file: File) -> Result<Commit, RepoError> {
        let bus = self.privsep.bus(WorkerKind::ReadCommit)?;
        bus.send_with_fd(&Message::CommitRequest, file.as_fd())?;
        let (msg, _) = bus.recv_expect(MsgKind::Commit)?;
        let Message::Commit(info) = msg else {
            return Err(IpcError::PrivsepMsg.into());
        };
        Ok(Commit {
            tree: info.tree,
            parents: info.parents,
            author: Signature::parse(BStr::new(&info.author))?,
            committer: Signature::parse(BStr::new(&info.committer))?,
            message: info.message,
        })
    }

    /// Ask the read-object worker for the raw bytes of the deflated
    /// loose object on `file`; bulk data lands in a temp file.
    pub(crate) fn raw_via_worker(&mut self, file: File) -> Result<RawObject, RepoError> {
        let mut outfile = tempfile::tempfile()?;
        let bus = self.privsep.bus(WorkerKind::ReadObject)?;
        bus.send_with_fd(&Message::RawObjectRequest, file.as_fd())?;
        bus.send_with_fd(&Message::RawObjectOutfd, outfile.as_fd())?;

        let (msg, _) = bus.recv_expect(MsgKind::RawObject)?;
        let Message::RawObject { size, hdrlen, data } = msg else {
            return Err(IpcError::PrivsepMsg.into());
        };

        let info = grit_object::header::parse(match &data {
            Some(inline) => inline.as_slice(),
            None => {
                // Header geometry travels in the message; sniff the kind
                // from the out file's first bytes.
                outfile.seek(SeekFrom::Start(0))?;
                return Ok(RawObject {
                    info: sniff_info(&outfile, size, hdrlen)?,
                    data: RawData::File(outfile),
                });
            }
        })?;
        debug_assert_eq!(info.size, size);
        debug_assert_eq!(info.hdrlen as u64, hdrlen);
        Ok(RawObject {
            info,
            data: RawData::Inline(data.expect("inline data present")),
        })
    }

    /// The program path a worker kind resolves to (exposed for the
    /// send-pack driver).
    pub fn worker_program(&self, kind: WorkerKind) -> PathBuf {
        self.privsep.program_path(kind)
    }
}

/// Parse the object kind out of a file-backed raw object's header.
fn sniff_info(
    file: &File,
    size: u64,
    hdrlen: u64,
) -> Result<ObjectInfo, RepoError> {
    use std::os::unix::fs::FileExt;
    let mut head = [0u8; 64];
    let n = file.read_at(&mut head, 0)?;
    let info = grit_object::header::parse(&head[..n])?;
    debug_assert_eq!(info.size, size);
    debug_assert_eq!(info.hdrlen as u64, hdrlen);
    Ok(info)
}
