//! Decode a single loose commit from an inherited fd and return its
//! fields.

use std::fs::File;

use grit_ipc::{sigint, Bus, CommitInfo, IpcError, Message};
use grit_object::{Commit, ObjectKind};
use grit_workers::{exit_with, inflate_loose, setup};

fn main() {
    let mut bus = match setup() {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("{}: {e}", grit_workers::progname());
            std::process::exit(1);
        }
    };
    let result = serve(&mut bus);
    exit_with(&mut bus, result);
}

fn serve(bus: &mut Bus) -> anyhow::Result<()> {
    loop {
        if sigint::sigint_received() {
            return Err(IpcError::Cancelled.into());
        }

        let (msg, fd) = match bus.recv() {
            Ok(received) => received,
            Err(IpcError::PrivsepPipe) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match msg {
            Message::Stop => return Ok(()),
            Message::CommitRequest => {
                let file = File::from(fd.ok_or(IpcError::PrivsepNoFd)?);
                let (info, inflated) = inflate_loose(file)?;
                if info.kind != ObjectKind::Commit {
                    anyhow::bail!("not a commit: {}", info.kind);
                }
                let commit = Commit::parse(&inflated[info.hdrlen..])?;
                bus.send(&Message::Commit(CommitInfo {
                    tree: commit.tree,
                    parents: commit.parents,
                    author: commit.author.to_bytes(),
                    committer: commit.committer.to_bytes(),
                    message: commit.message,
                }))?;
            }
            _ => return Err(IpcError::PrivsepMsg.into()),
        }
    }
}
