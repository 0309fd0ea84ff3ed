//! Send-pack: announce refs, negotiate capabilities, upload a pack,
//! collect the status report.
//!
//! The state machine runs in the privsep worker ([`run_send_pack`]) with
//! the wire on one fd and the parent bus on another; the parent side
//! ([`send_pack`]) spawns the worker, feeds it the ref set, services its
//! pack-fd request, and surfaces progress events.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;

use grit_hash::ObjectId;
use grit_ipc::{spawn_worker, Bus, IpcError, Message, MsgKind};

use crate::gitproto::{self, CAPA_DELETE_REFS};
use crate::{pktline, ProtocolError};

/// Pack bytes are streamed to the remote in chunks of this size, with an
/// upload-progress message after each chunk.
pub const UPLOAD_CHUNK: usize = 8192;

/// One ref to update (or delete) on the remote.
#[derive(Debug, Clone)]
pub struct SendRefSpec {
    pub name: String,
    /// The id to advance the remote ref to; ignored for deletions.
    pub id: ObjectId,
    pub delete: bool,
}

/// Events surfaced to the caller of [`send_pack`].
#[derive(Debug, Clone)]
pub enum SendEvent {
    /// A ref advertised by the remote.
    RemoteRef { id: ObjectId, name: String },
    /// Running total of uploaded pack bytes.
    UploadProgress { bytes: u64 },
    /// Per-ref verdict from the remote's status report.
    RefStatus { name: String, success: bool },
}

/// Reject refs that make no sense outside the local repository.
pub fn validate_ref_name(name: &str) -> Result<(), ProtocolError> {
    if name.starts_with("refs/got/") || name.starts_with("refs/remotes/") {
        return Err(ProtocolError::SendBadRef(name.to_string()));
    }
    Ok(())
}

/// Worker side: speak the send half of the smart-v1 protocol on `wire`,
/// reporting to the parent over `bus`.
pub fn run_send_pack(
    wire: &mut (impl Read + Write),
    bus: &mut Bus,
    refs: &[SendRefSpec],
    chatty: u32,
) -> Result<(), ProtocolError> {
    if refs.is_empty() {
        return Err(ProtocolError::SendEmpty);
    }

    let mut buf = vec![0u8; pktline::PKT_MAX];

    // Ref advertisement: every ref the remote has, capabilities on the
    // first frame, flush at the end.
    let mut their_refs: Vec<(String, ObjectId)> = Vec::new();
    let mut my_capabilities = String::new();
    let mut first_frame = true;
    loop {
        let n = pktline::read_pkt(wire, &mut buf, chatty)?;
        if n == 0 {
            break;
        }
        let frame = &buf[..n];
        if let Some(errmsg) = frame.strip_prefix(b"ERR ") {
            return Err(server_error(errmsg));
        }

        let line = gitproto::parse_refline(frame)?;
        if first_frame {
            my_capabilities = gitproto::match_capabilities(&line.capabilities);
            if chatty > 0 {
                eprintln!("server capabilities: {}", line.capabilities);
                eprintln!("my capabilities: {my_capabilities}");
            }
            first_frame = false;
        }
        // Peeled tag targets ride along as "<tag>^{}"; not real refs.
        if line.refname.ends_with("^{}") {
            continue;
        }

        let id = ObjectId::from_hex(&line.id_hex)
            .map_err(|_| ProtocolError::BadObjIdStr(line.id_hex.clone()))?;
        bus.send(&Message::SendRemoteRef {
            id,
            name: line.refname.clone(),
        })?;
        their_refs.push((line.refname, id));
    }

    if refs.iter().any(|r| r.delete)
        && !gitproto::has_capability(&my_capabilities, CAPA_DELETE_REFS)
    {
        return Err(ProtocolError::CapaDeleteRefs);
    }

    // Update commands: deletions first, then updates whose id differs
    // from the remote's. The first command carries our capabilities.
    let mut sent_capabilities = false;
    let mut sent_names: Vec<&str> = Vec::new();
    for spec in refs.iter().filter(|r| r.delete) {
        let their_id = lookup(&their_refs, &spec.name).ok_or_else(|| {
            ProtocolError::NotRef(format!(
                "{} does not exist in remote repository",
                spec.name
            ))
        })?;
        write_update(
            wire,
            &their_id,
            &ObjectId::NULL,
            &spec.name,
            &my_capabilities,
            &mut sent_capabilities,
            chatty,
        )?;
        sent_names.push(&spec.name);
    }
    for spec in refs.iter().filter(|r| !r.delete) {
        let their_id = lookup(&their_refs, &spec.name);
        if their_id == Some(spec.id) {
            continue;
        }
        write_update(
            wire,
            &their_id.unwrap_or(ObjectId::NULL),
            &spec.id,
            &spec.name,
            &my_capabilities,
            &mut sent_capabilities,
            chatty,
        )?;
        sent_names.push(&spec.name);
    }
    pktline::write_flush(wire, chatty)?;

    // Pack upload: ask the parent for the pack fd and stream it.
    bus.send(&Message::SendPackRequest)?;
    let (_, packfd) = bus.recv_expect(MsgKind::SendPackfd)?;
    let packfd = packfd.ok_or(IpcError::PrivsepNoFd)?;
    let mut pack = File::from(packfd);
    pack.seek(SeekFrom::Start(0))?;

    let mut total: u64 = 0;
    let mut chunk = [0u8; UPLOAD_CHUNK];
    loop {
        let n = pack.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        wire.write_all(&chunk[..n])?;
        total += n as u64;
        bus.send(&Message::SendUploadProgress { bytes: total })?;
    }
    wire.flush()?;

    // Status report: "unpack ok", then one frame per sent command.
    let n = pktline::read_pkt(wire, &mut buf, chatty)?;
    let frame = &buf[..n];
    if let Some(errmsg) = frame.strip_prefix(b"ERR ") {
        return Err(server_error(errmsg));
    }
    if frame != b"unpack ok\n" {
        return Err(ProtocolError::BadPacket(
            "unexpected message from server".into(),
        ));
    }

    for _ in 0..sent_names.len() {
        let n = pktline::read_pkt(wire, &mut buf, chatty)?;
        let frame = &buf[..n];
        let (success, rest) = if let Some(rest) = frame.strip_prefix(b"ok ") {
            (true, rest)
        } else if let Some(rest) = frame.strip_prefix(b"ng ") {
            (false, rest)
        } else {
            return Err(ProtocolError::BadPacket(
                "unexpected message from server".into(),
            ));
        };

        let text = String::from_utf8_lossy(rest);
        let refname = text
            .split(|c: char| c == ' ' || c == '\n')
            .next()
            .unwrap_or("");
        if !sent_names.iter().any(|name| *name == refname) {
            return Err(ProtocolError::BadPacket(
                "unexpected message from server".into(),
            ));
        }
        bus.send(&Message::SendRefStatus {
            success,
            name: refname.to_string(),
        })?;
    }

    bus.send(&Message::SendDone)?;
    Ok(())
}

/// Parent side: spawn the send worker, hand it the wire and the ref set,
/// service its pack request, and forward events until it reports done.
pub fn send_pack(
    worker_program: &Path,
    wire: BorrowedFd<'_>,
    pack_file: &File,
    refs: &[SendRefSpec],
    chatty: u32,
    mut on_event: impl FnMut(SendEvent),
) -> Result<(), ProtocolError> {
    let mut handle = spawn_worker(worker_program, &[])?;

    handle.bus.send_with_fd(
        &Message::SendRequest {
            verbosity: chatty,
            nrefs: refs.len() as u32,
        },
        wire,
    )?;
    for spec in refs {
        handle.bus.send(&Message::SendRef {
            delete: spec.delete,
            id: spec.id,
            name: spec.name.clone(),
        })?;
    }

    loop {
        let (msg, _) = handle.bus.recv()?;
        match msg {
            Message::SendRemoteRef { id, name } => on_event(SendEvent::RemoteRef { id, name }),
            Message::SendPackRequest => handle
                .bus
                .send_with_fd(&Message::SendPackfd, pack_file.as_fd())?,
            Message::SendUploadProgress { bytes } => {
                on_event(SendEvent::UploadProgress { bytes })
            }
            Message::SendRefStatus { success, name } => {
                on_event(SendEvent::RefStatus { name, success })
            }
            Message::SendDone => break,
            Message::Error { msg, .. } => {
                let _ = handle.stop();
                return Err(ProtocolError::SendFailed(msg));
            }
            _ => return Err(IpcError::PrivsepMsg.into()),
        }
    }

    handle.stop()?;
    Ok(())
}

fn lookup(their_refs: &[(String, ObjectId)], name: &str) -> Option<ObjectId> {
    their_refs
        .iter()
        .find(|(their_name, _)| their_name == name)
        .map(|(_, id)| *id)
}

#[allow(clippy::too_many_arguments)]
fn write_update(
    wire: &mut impl Write,
    old: &ObjectId,
    new: &ObjectId,
    refname: &str,
    capabilities: &str,
    sent_capabilities: &mut bool,
    chatty: u32,
) -> Result<(), ProtocolError> {
    // The first command announces capabilities after an embedded NUL.
    let line = if *sent_capabilities {
        format!("{old} {new} {refname}\n").into_bytes()
    } else {
        *sent_capabilities = true;
        format!("{old} {new} {refname}\0{capabilities}\n").into_bytes()
    };
    pktline::write_pkt(wire, &line, chatty)
}

fn server_error(raw: &[u8]) -> ProtocolError {
    if raw.iter().any(|&b| !b.is_ascii_graphic() && b != b' ') {
        return ProtocolError::BadPacket(
            "non-printable error message received from server".into(),
        );
    }
    ProtocolError::SendFailed(String::from_utf8_lossy(raw).trim_end().to_string())
}
