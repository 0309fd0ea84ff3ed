//! Git smart-v1 wire protocol, send direction.
//!
//! The transport is an already-open bidirectional byte stream; TLS/SSH
//! plumbing lives below this crate. Framing is pkt-line, and the send-pack
//! state machine runs in a privsep worker talking to its parent over the
//! message bus.

pub mod gitproto;
pub mod pktline;
pub mod send;

pub use gitproto::{match_capabilities, parse_refline, RefLine};
pub use send::{run_send_pack, send_pack, SendEvent, SendRefSpec};

use grit_ipc::IpcError;

/// Errors from framing and the send protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("bad packet: {0}")]
    BadPacket(String),

    #[error("no space")]
    NoSpace,

    #[error("not a reference: {0}")]
    NotRef(String),

    #[error("bad object id string: {0}")]
    BadObjIdStr(String),

    #[error("refusing to send ref {0}")]
    SendBadRef(String),

    #[error("no references to send")]
    SendEmpty,

    #[error("server error: {0}")]
    SendFailed(String),

    #[error("server does not support deletion of references")]
    CapaDeleteRefs,

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
