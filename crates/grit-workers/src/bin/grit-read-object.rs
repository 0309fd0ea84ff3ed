//! Decode a single loose object from an inherited fd.
//!
//! Serves two request shapes: `ObjectRequest` returns header info only;
//! `RawObjectRequest` (followed by `RawObjectOutfd`) returns the full
//! inflated bytes — inline when small, written to the out fd otherwise.

use std::fs::File;
use std::io::Write;

use grit_ipc::{sigint, Bus, IpcError, Message, MAX_INLINE_OBJECT_DATA};
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
            // Parent closed its end: graceful EOF.
            Err(IpcError::PrivsepPipe) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match msg {
            Message::Stop => return Ok(()),
            Message::ObjectRequest => {
                let file = File::from(fd.ok_or(IpcError::PrivsepNoFd)?);
                let (info, _) = inflate_loose(file)?;
                bus.send(&Message::Object(info))?;
            }
            Message::RawObjectRequest => {
                let file = File::from(fd.ok_or(IpcError::PrivsepNoFd)?);

                let (outmsg, outfd) = bus.recv()?;
                match outmsg {
                    Message::Stop => return Ok(()),
                    Message::RawObjectOutfd => {}
                    _ => return Err(IpcError::PrivsepMsg.into()),
                }
                let outfd = outfd.ok_or(IpcError::PrivsepNoFd)?;

                let (info, inflated) = inflate_loose(file)?;
                let data = if inflated.len() <= MAX_INLINE_OBJECT_DATA {
                    Some(inflated)
                } else {
                    let mut out = File::from(outfd);
                    out.write_all(&inflated)?;
                    out.flush()?;
                    None
                };
                bus.send(&Message::RawObject {
                    size: info.size,
                    hdrlen: info.hdrlen as u64,
                    data,
                })?;
            }
            _ => return Err(IpcError::PrivsepMsg.into()),
        }
    }
}
