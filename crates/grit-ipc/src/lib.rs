//! Typed message bus between the parent process and privsep workers.
//!
//! Untrusted work — raw object parsing, the network protocol, gitconfig
//! parsing — runs in child processes that drop privileges and talk to the
//! parent over a socketpair. Messages are length-prefixed envelopes with a
//! discriminated-union body and at most one passed file descriptor each;
//! delivery is FIFO per channel.

mod bus;
mod envelope;
mod message;
pub mod sandbox;
pub mod sigint;
mod spawn;

pub use bus::Bus;
pub use envelope::{Envelope, ENVELOPE_LEN, MAX_MSG_LEN};

/// Raw objects up to this inflated size come back inline over the bus;
/// larger ones are written to the parent-supplied out fd.
pub const MAX_INLINE_OBJECT_DATA: usize = 8192;
pub use message::{CommitInfo, ConfigField, Message, MsgKind};
pub use spawn::{spawn_worker, WorkerHandle, CHILD_BUS_FD};

/// Errors from bus operations and the privsep protocol.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("unexpected privsep message")]
    PrivsepMsg,

    #[error("unexpected privsep message length")]
    PrivsepLen,

    #[error("privsep message without expected file descriptor")]
    PrivsepNoFd,

    #[error("privsep pipe closed")]
    PrivsepPipe,

    #[error("no space")]
    NoSpace,

    #[error("operation cancelled")]
    Cancelled,

    #[error("worker {program} reported: {msg}")]
    Worker { program: String, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Errno(#[from] nix::errno::Errno),
}
