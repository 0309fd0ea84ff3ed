use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command};

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

use crate::{Bus, IpcError};

/// The fixed descriptor number a worker finds its bus on.
pub const CHILD_BUS_FD: i32 = 3;

/// A spawned worker and the parent's end of its bus.
pub struct WorkerHandle {
    pub child: Child,
    pub bus: Bus,
}

impl WorkerHandle {
    /// Send `Stop` and wait for the worker to exit.
    ///
    /// A worker that already closed its end of the socket is treated as
    /// stopped; a non-zero exit status is reported.
    pub fn stop(mut self) -> Result<(), IpcError> {
        match self.bus.send(&crate::Message::Stop) {
            Ok(()) | Err(IpcError::PrivsepPipe) => {}
            Err(e) if is_broken_pipe(&e) => {}
            Err(e) => return Err(e),
        }
        drop(self.bus);
        let status = self.child.wait()?;
        if !status.success() {
            return Err(IpcError::Worker {
                program: "worker".into(),
                msg: format!("exited with {status}"),
            });
        }
        Ok(())
    }
}

fn is_broken_pipe(err: &IpcError) -> bool {
    matches!(
        err,
        IpcError::Errno(nix::errno::Errno::EPIPE) | IpcError::Errno(nix::errno::Errno::ECONNRESET)
    ) || matches!(err, IpcError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
}

/// Spawn a worker binary with a fresh socketpair bus dup'd onto
/// [`CHILD_BUS_FD`] in the child.
pub fn spawn_worker(program: &Path, args: &[&str]) -> Result<WorkerHandle, IpcError> {
    let (parent_end, child_end): (OwnedFd, OwnedFd) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        // Close-on-exec on both ends; the dup2 below clears it for the
        // descriptor the child actually keeps.
        SockFlag::SOCK_CLOEXEC,
    )?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    let child_raw = child_end.as_raw_fd();
    unsafe {
        cmd.pre_exec(move || {
            if libc::dup2(child_raw, CHILD_BUS_FD) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn()?;
    drop(child_end);

    Ok(WorkerHandle {
        child,
        bus: Bus::new(UnixStream::from(parent_end)),
    })
}
