//! End-to-end tests driving the real worker binaries.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_ipc::{spawn_worker, ConfigField, Message, MsgKind};
use grit_loose::LooseStore;
use grit_object::ObjectKind;
use grit_protocol::pktline;
use grit_protocol::send::{send_pack, SendEvent, SendRefSpec};

fn libexec_dir() -> PathBuf {
    Path::new(env!("CARGO_BIN_EXE_grit-read-object"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn oid(hex_char: char) -> ObjectId {
    ObjectId::from_hex(&hex_char.to_string().repeat(40)).unwrap()
}

#[test]
fn read_object_reports_header_info() {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::open(dir.path());
    let id = store.write(ObjectKind::Blob, b"worker-visible blob").unwrap();
    let fd = store.open_fd(&id).unwrap().unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-object")), &[]).unwrap();
    handle
        .bus
        .send_with_fd(&Message::ObjectRequest, fd.as_fd())
        .unwrap();
    let (msg, _) = handle.bus.recv_expect(MsgKind::Object).unwrap();
    match msg {
        Message::Object(info) => {
            assert_eq!(info.kind, ObjectKind::Blob);
            assert_eq!(info.size, 19);
            assert_eq!(info.hdrlen, b"blob 19\0".len());
        }
        other => panic!("unexpected message: {other:?}"),
    }
    handle.stop().unwrap();
}

#[test]
fn read_object_raw_inline() {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::open(dir.path());
    let id = store.write(ObjectKind::Blob, b"small raw").unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-object")), &[]).unwrap();
    let fd = store.open_fd(&id).unwrap().unwrap();
    let out = tempfile::tempfile().unwrap();
    handle
        .bus
        .send_with_fd(&Message::RawObjectRequest, fd.as_fd())
        .unwrap();
    handle
        .bus
        .send_with_fd(&Message::RawObjectOutfd, out.as_fd())
        .unwrap();

    let (msg, _) = handle.bus.recv_expect(MsgKind::RawObject).unwrap();
    match msg {
        Message::RawObject { size, hdrlen, data } => {
            assert_eq!(size, 9);
            assert_eq!(hdrlen, b"blob 9\0".len() as u64);
            assert_eq!(data.unwrap(), b"blob 9\0small raw");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    handle.stop().unwrap();
}

#[test]
fn read_object_raw_bulk_goes_to_outfd() {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::open(dir.path());
    let payload = vec![0xabu8; 64 * 1024];
    let id = store.write(ObjectKind::Blob, &payload).unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-object")), &[]).unwrap();
    let fd = store.open_fd(&id).unwrap().unwrap();
    let mut out = tempfile::tempfile().unwrap();
    handle
        .bus
        .send_with_fd(&Message::RawObjectRequest, fd.as_fd())
        .unwrap();
    handle
        .bus
        .send_with_fd(&Message::RawObjectOutfd, out.as_fd())
        .unwrap();

    let (msg, _) = handle.bus.recv_expect(MsgKind::RawObject).unwrap();
    match msg {
        Message::RawObject { size, data, .. } => {
            assert_eq!(size, payload.len() as u64);
            assert!(data.is_none(), "bulk data must go to the out fd");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    out.seek(SeekFrom::Start(0)).unwrap();
    let mut written = Vec::new();
    out.read_to_end(&mut written).unwrap();
    assert_eq!(written.len(), b"blob 65536\0".len() + payload.len());
    assert!(written.starts_with(b"blob 65536\0"));
    assert_eq!(&written[b"blob 65536\0".len()..], &payload[..]);

    handle.stop().unwrap();
}

#[test]
fn read_commit_decodes_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::open(dir.path());
    let commit_payload = b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n\
parent 1111111111111111111111111111111111111111\n\
author Worker Author <worker@example.com> 1700000000 +0100\n\
committer Worker Committer <committer@example.com> 1700000001 -0500\n\
\n\
decoded by the worker\n";
    let id = store.write(ObjectKind::Commit, commit_payload).unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-commit")), &[]).unwrap();
    let fd = store.open_fd(&id).unwrap().unwrap();
    handle
        .bus
        .send_with_fd(&Message::CommitRequest, fd.as_fd())
        .unwrap();

    let (msg, _) = handle.bus.recv_expect(MsgKind::Commit).unwrap();
    match msg {
        Message::Commit(info) => {
            assert_eq!(
                info.tree.to_hex(),
                "da39a3ee5e6b4b0d3255bfef95601890afd80709"
            );
            assert_eq!(info.parents.len(), 1);
            assert_eq!(
                info.author.to_string(),
                "Worker Author <worker@example.com> 1700000000 +0100"
            );
            assert_eq!(info.message.to_string(), "decoded by the worker\n");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    handle.stop().unwrap();
}

#[test]
fn read_commit_rejects_non_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = LooseStore::open(dir.path());
    let id = store.write(ObjectKind::Blob, b"not a commit").unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-commit")), &[]).unwrap();
    let fd = store.open_fd(&id).unwrap().unwrap();
    handle
        .bus
        .send_with_fd(&Message::CommitRequest, fd.as_fd())
        .unwrap();

    let (msg, _) = handle.bus.recv().unwrap();
    assert!(matches!(msg, Message::Error { .. }), "got: {msg:?}");
    // The worker exits non-zero after a fatal error.
    let status = handle.child.wait().unwrap();
    assert!(!status.success());
}

#[test]
fn read_gitconfig_serves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config");
    std::fs::write(
        &config_path,
        "[core]\n\trepositoryformatversion = 0\n\towner = The Owner\n\
[user]\n\tname = Cfg Name\n\temail = cfg@example.com\n\
[extensions]\n\tnoop = true\n\tpreciousObjects = true\n",
    )
    .unwrap();

    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-gitconfig")), &[]).unwrap();
    let file = File::open(&config_path).unwrap();
    handle
        .bus
        .send_with_fd(&Message::GitconfigParseRequest, file.as_fd())
        .unwrap();

    handle
        .bus
        .send(&Message::GitconfigIntRequest(
            ConfigField::RepositoryFormatVersion,
        ))
        .unwrap();
    let (msg, _) = handle.bus.recv_expect(MsgKind::GitconfigInt).unwrap();
    assert!(matches!(msg, Message::GitconfigInt(0)));

    handle
        .bus
        .send(&Message::GitconfigStrRequest(ConfigField::AuthorName))
        .unwrap();
    let (msg, _) = handle.bus.recv_expect(MsgKind::GitconfigStr).unwrap();
    assert!(matches!(msg, Message::GitconfigStr(Some(name)) if name == "Cfg Name"));

    handle
        .bus
        .send(&Message::GitconfigStrRequest(ConfigField::Owner))
        .unwrap();
    let (msg, _) = handle.bus.recv_expect(MsgKind::GitconfigStr).unwrap();
    assert!(matches!(msg, Message::GitconfigStr(Some(owner)) if owner == "The Owner"));

    handle
        .bus
        .send(&Message::GitconfigExtensionsRequest)
        .unwrap();
    let (msg, _) = handle.bus.recv_expect(MsgKind::GitconfigInt).unwrap();
    let Message::GitconfigInt(count) = msg else {
        panic!()
    };
    assert_eq!(count, 2);
    let mut extensions = Vec::new();
    for _ in 0..count {
        let (msg, _) = handle.bus.recv_expect(MsgKind::GitconfigStr).unwrap();
        if let Message::GitconfigStr(Some(ext)) = msg {
            extensions.push(ext);
        }
    }
    assert_eq!(extensions, vec!["noop", "preciousobjects"]);

    handle.stop().unwrap();
}

#[test]
fn unexpected_message_is_fatal() {
    let mut handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-object")), &[]).unwrap();
    handle.bus.send(&Message::SendDone).unwrap();
    let (msg, _) = handle.bus.recv().unwrap();
    assert!(matches!(msg, Message::Error { .. }));
    let status = handle.child.wait().unwrap();
    assert!(!status.success());
}

/// Script the remote side of a send: advertisement out, updates and pack
/// in, status report out.
fn script_server(
    mut wire: UnixStream,
    adv: Vec<(String, ObjectId)>,
    capabilities: &'static str,
    expect_pack: usize,
    status: Vec<String>,
) -> std::thread::JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        for (i, (name, id)) in adv.iter().enumerate() {
            let line = if i == 0 {
                format!("{id} {name}\0{capabilities}\n")
            } else {
                format!("{id} {name}\n")
            };
            pktline::write_pkt(&mut wire, line.as_bytes(), 0).unwrap();
        }
        pktline::write_flush(&mut wire, 0).unwrap();

        let mut updates = Vec::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = match pktline::read_pkt(&mut wire, &mut buf, 0) {
                Ok(n) => n,
                Err(_) => return updates,
            };
            if n == 0 {
                break;
            }
            updates.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        }

        let mut pack = vec![0u8; expect_pack];
        let mut filled = 0;
        while filled < expect_pack {
            match wire.read(&mut pack[filled..]) {
                Ok(0) | Err(_) => return updates,
                Ok(n) => filled += n,
            }
        }

        for frame in status {
            if pktline::write_pkt(&mut wire, frame.as_bytes(), 0).is_err() {
                return updates;
            }
        }
        let _ = pktline::write_flush(&mut wire, 0);
        updates
    })
}

#[test]
fn send_pack_worker_end_to_end() {
    let (wire, server_wire) = UnixStream::pair().unwrap();

    let server = script_server(
        server_wire,
        vec![
            ("refs/tags/v1".to_string(), oid('1')),
            ("refs/tags/v1^{}".to_string(), oid('2')),
            ("refs/heads/main".to_string(), oid('a')),
        ],
        "report-status delete-refs ofs-delta",
        20000,
        vec![
            "unpack ok\n".to_string(),
            "ok refs/heads/main\n".to_string(),
        ],
    );

    let mut pack_file = tempfile::tempfile().unwrap();
    pack_file.write_all(&vec![0x77u8; 20000]).unwrap();

    let refs = vec![SendRefSpec {
        name: "refs/heads/main".into(),
        id: oid('b'),
        delete: false,
    }];

    let mut remote_refs = Vec::new();
    let mut progress = Vec::new();
    let mut statuses = Vec::new();
    send_pack(
        Path::new(env!("CARGO_BIN_EXE_grit-send-pack")),
        wire.as_fd(),
        &pack_file,
        &refs,
        0,
        |event| match event {
            SendEvent::RemoteRef { name, .. } => remote_refs.push(name),
            SendEvent::UploadProgress { bytes } => progress.push(bytes),
            SendEvent::RefStatus { name, success } => statuses.push((name, success)),
        },
    )
    .unwrap();
    drop(wire);

    // The peeled tag target is filtered out of the remote ref report.
    assert_eq!(remote_refs, vec!["refs/tags/v1", "refs/heads/main"]);
    assert_eq!(progress, vec![8192, 16384, 20000]);
    assert_eq!(statuses, vec![("refs/heads/main".to_string(), true)]);

    let updates = server.join().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains("refs/heads/main"));
}

#[test]
fn send_pack_worker_rejects_private_refs() {
    let (wire, _server_wire) = UnixStream::pair().unwrap();
    let pack_file = tempfile::tempfile().unwrap();

    let refs = vec![SendRefSpec {
        name: "refs/remotes/origin/main".into(),
        id: oid('a'),
        delete: false,
    }];

    let err = send_pack(
        Path::new(env!("CARGO_BIN_EXE_grit-send-pack")),
        wire.as_fd(),
        &pack_file,
        &refs,
        0,
        |_| {},
    )
    .unwrap_err();
    // The worker reports the rejection before touching the wire.
    let msg = err.to_string();
    assert!(msg.contains("refs/remotes/origin/main"), "error: {msg}");
}

#[test]
fn repository_decodes_loose_objects_through_workers() {
    let dir = tempfile::tempdir().unwrap();
    let repo_dir = dir.path().join("repo.git");
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::write(work.join("file.txt"), b"worker pipeline\n").unwrap();
    std::fs::write(work.join("big.bin"), vec![0x42u8; 64 * 1024]).unwrap();

    grit_repository::init(&repo_dir).unwrap();
    let mut repo = grit_repository::Repository::open(&repo_dir, None).unwrap();
    repo.set_libexec_dir(libexec_dir());

    let commit_id = repo
        .import(
            &work,
            "E2E Author <e2e@example.com>",
            "imported for the worker pipeline\n",
            &[],
            &mut |_| {},
        )
        .unwrap();

    // Loose commit decoding goes through grit-read-commit.
    let commit = repo.open_commit(&commit_id).unwrap();
    assert_eq!(commit.author.name.as_slice(), b"E2E Author");
    assert_eq!(
        commit.message.as_slice(),
        b"imported for the worker pipeline\n"
    );

    // Object info and raw bytes go through grit-read-object; the big
    // blob arrives through the out fd.
    let tree = repo.open_tree(&commit.tree).unwrap();
    let small = tree.find(b"file.txt").unwrap().id;
    let big = tree.find(b"big.bin").unwrap().id;

    let info = repo.open_object(&small).unwrap();
    assert_eq!(info.kind, ObjectKind::Blob);
    assert_eq!(info.size, 16);

    let raw = repo.open_raw(&big).unwrap();
    assert_eq!(raw.info.size, 64 * 1024);
    assert_eq!(raw.payload().unwrap(), vec![0x42u8; 64 * 1024]);

    repo.close().unwrap();
}

#[test]
fn stop_terminates_worker_cleanly() {
    let handle =
        spawn_worker(Path::new(env!("CARGO_BIN_EXE_grit-read-object")), &[]).unwrap();
    handle.stop().unwrap();
}
