//! The send-pack worker: speaks the smart-v1 send protocol on the wire
//! fd handed over with the request, reporting back over the bus.

use std::fs::File;

use grit_ipc::{sigint, Bus, IpcError, Message};
use grit_protocol::send::{run_send_pack, validate_ref_name, SendRefSpec};
use grit_workers::{exit_with, setup};

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
    let (msg, wire_fd) = match bus.recv() {
        Ok(received) => received,
        Err(IpcError::PrivsepPipe) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let (verbosity, nrefs) = match msg {
        Message::Stop => return Ok(()),
        Message::SendRequest { verbosity, nrefs } => (verbosity, nrefs),
        _ => return Err(IpcError::PrivsepMsg.into()),
    };
    let mut wire = File::from(wire_fd.ok_or(IpcError::PrivsepNoFd)?);

    let mut refs = Vec::with_capacity(nrefs as usize);
    for _ in 0..nrefs {
        if sigint::sigint_received() {
            return Err(IpcError::Cancelled.into());
        }
        let (msg, _) = bus.recv()?;
        match msg {
            Message::Stop => return Ok(()),
            Message::SendRef { delete, id, name } => {
                // refs/got/ and refs/remotes/ make no sense outside the
                // local repository; refuse before any wire traffic.
                validate_ref_name(&name)?;
                refs.push(SendRefSpec { name, id, delete });
            }
            _ => return Err(IpcError::PrivsepMsg.into()),
        }
    }

    run_send_pack(&mut wire, bus, &refs, verbosity)?;
    Ok(())
}
