//! Shared runtime for the privsep worker binaries.
//!
//! Each worker adopts the bus on its fixed fd, installs the SIGINT flag,
//! drops privileges, and loops over requests. On fatal error it writes
//! `"<progname>: <message>"` to stderr, reports the error over the bus
//! (unless the parent is gone), and exits non-zero.

use std::fs::File;
use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_ipc::{sandbox, sigint, Bus, IpcError, Message, CHILD_BUS_FD};
use grit_object::{header, ObjectInfo};

/// Adopt the bus, install the SIGINT flag, and drop privileges.
pub fn setup() -> Result<Bus, IpcError> {
    sigint::install_handler();
    let bus = unsafe { Bus::from_raw_fd(CHILD_BUS_FD) };
    sandbox::drop_privileges()?;
    Ok(bus)
}

/// Report a fatal error and exit.
///
/// Cancellation and a closed parent pipe are quiet exits; everything
/// else is echoed to stderr and sent upstream.
pub fn exit_with(bus: &mut Bus, result: Result<(), anyhow::Error>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            match quiet_exit(&err) {
                Some(code) => std::process::exit(code),
                None => {}
            }
            eprintln!("{}: {err}", progname());
            let _ = bus.send(&Message::Error {
                code: 1,
                msg: err.to_string(),
            });
            std::process::exit(1);
        }
    }
}

/// Cancellation and a closed parent pipe exit without an error report.
fn quiet_exit(err: &anyhow::Error) -> Option<i32> {
    let ipc = err.downcast_ref::<IpcError>().or(match err
        .downcast_ref::<grit_protocol::ProtocolError>()
    {
        Some(grit_protocol::ProtocolError::Ipc(ipc)) => Some(ipc),
        _ => None,
    })?;
    match ipc {
        IpcError::PrivsepPipe => Some(0),
        IpcError::Cancelled => Some(1),
        _ => None,
    }
}

pub fn progname() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(|arg0| {
            std::path::Path::new(arg0)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| arg0.to_string())
        })
        .unwrap_or_else(|| "grit-worker".into())
}

/// Inflate a deflated loose object from an fd and split off its header.
///
/// The inflated length must agree with the header's declared size.
pub fn inflate_loose(file: File) -> anyhow::Result<(ObjectInfo, Vec<u8>)> {
    let mut decoder = ZlibDecoder::new(file);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;

    let info = header::parse(&inflated)?;
    let total = info.hdrlen as u64 + info.size;
    if (inflated.len() as u64) < info.hdrlen as u64 || inflated.len() as u64 != total {
        anyhow::bail!(
            "bad object header: inflated {} bytes, header claims {total}",
            inflated.len()
        );
    }
    Ok((info, inflated))
}
