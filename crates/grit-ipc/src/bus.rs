use std::collections::VecDeque;
use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

use crate::envelope::{Envelope, ENVELOPE_LEN};
use crate::message::{Message, MsgKind};
use crate::IpcError;

const FILL_CHUNK: usize = 65536;

/// One end of the privsep message channel.
///
/// Wraps a stream socketpair half with read buffering and a queue of
/// received descriptors; messages are delivered in FIFO order and each
/// fd-carrying message claims the next queued descriptor.
pub struct Bus {
    sock: UnixStream,
    rbuf: Vec<u8>,
    fds: VecDeque<OwnedFd>,
}

impl Bus {
    pub fn new(sock: UnixStream) -> Self {
        Self {
            sock,
            rbuf: Vec::new(),
            fds: VecDeque::new(),
        }
    }

    /// Adopt an inherited descriptor (the child's fixed bus fd).
    ///
    /// # Safety
    /// `fd` must be an open Unix stream socket owned by the caller.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self::new(UnixStream::from_raw_fd(fd))
    }

    /// A connected pair, for in-process tests and thread-backed workers.
    pub fn pair() -> Result<(Self, Self), IpcError> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::new(a), Self::new(b)))
    }

    /// Send a message without a descriptor.
    pub fn send(&mut self, msg: &Message) -> Result<(), IpcError> {
        self.send_inner(msg, None)
    }

    /// Send a message with its attached descriptor.
    pub fn send_with_fd(&mut self, msg: &Message, fd: BorrowedFd<'_>) -> Result<(), IpcError> {
        self.send_inner(msg, Some(fd))
    }

    fn send_inner(&mut self, msg: &Message, fd: Option<BorrowedFd<'_>>) -> Result<(), IpcError> {
        let payload = msg.encode_payload();
        let envelope = Envelope::new(msg.kind() as u32, payload.len())?;

        let mut data = Vec::with_capacity(ENVELOPE_LEN + payload.len());
        data.extend_from_slice(&envelope.encode());
        data.extend_from_slice(&payload);

        let mut sent = 0;
        while sent < data.len() {
            let iov = [IoSlice::new(&data[sent..])];
            // The descriptor rides along with the first chunk only.
            let n = match fd {
                Some(fd) if sent == 0 => {
                    let raw_fds = [fd.as_raw_fd()];
                    let cmsgs = [ControlMessage::ScmRights(&raw_fds)];
                    sendmsg::<()>(self.sock.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)?
                }
                _ => sendmsg::<()>(self.sock.as_raw_fd(), &iov, &[], MsgFlags::empty(), None)?,
            };
            if n == 0 {
                return Err(IpcError::PrivsepPipe);
            }
            sent += n;
        }
        Ok(())
    }

    /// Receive the next message, blocking until one whole message is
    /// available. Returns the claimed descriptor for fd-carrying kinds.
    ///
    /// EOF from the peer is `PrivsepPipe`; at a worker's main-loop recv
    /// that is a graceful parent close.
    pub fn recv(&mut self) -> Result<(Message, Option<OwnedFd>), IpcError> {
        loop {
            if self.rbuf.len() >= ENVELOPE_LEN {
                let envelope = Envelope::decode(&self.rbuf)?;
                let total = envelope.len as usize;
                if self.rbuf.len() >= total {
                    let kind = MsgKind::from_u32(envelope.kind)?;
                    let msg =
                        Message::decode_payload(kind, &self.rbuf[ENVELOPE_LEN..total])?;
                    self.rbuf.drain(..total);
                    let fd = if kind_wants_fd(kind) {
                        self.fds.pop_front()
                    } else {
                        None
                    };
                    return Ok((msg, fd));
                }
            }
            self.fill()?;
        }
    }

    /// Receive and require a specific kind; `Stop` is surfaced as
    /// `Cancelled`, a worker `Error` as `Worker`.
    pub fn recv_expect(
        &mut self,
        expected: MsgKind,
    ) -> Result<(Message, Option<OwnedFd>), IpcError> {
        let (msg, fd) = self.recv()?;
        match msg {
            Message::Stop => Err(IpcError::Cancelled),
            Message::Error { msg, .. } => Err(IpcError::Worker {
                program: "worker".into(),
                msg,
            }),
            msg if msg.kind() == expected => Ok((msg, fd)),
            _ => Err(IpcError::PrivsepMsg),
        }
    }

    fn fill(&mut self) -> Result<(), IpcError> {
        let mut buf = vec![0u8; FILL_CHUNK];
        let mut cmsg_buf = nix::cmsg_space!([RawFd; 4]);
        let nread;
        {
            let mut iov = [IoSliceMut::new(&mut buf)];
            let msg = recvmsg::<()>(
                self.sock.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buf),
                MsgFlags::empty(),
            )?;
            nread = msg.bytes;
            for cmsg in msg.cmsgs()? {
                if let ControlMessageOwned::ScmRights(fds) = cmsg {
                    for fd in fds {
                        self.fds.push_back(unsafe { OwnedFd::from_raw_fd(fd) });
                    }
                }
            }
        }
        if nread == 0 {
            return Err(IpcError::PrivsepPipe);
        }
        self.rbuf.extend_from_slice(&buf[..nread]);
        Ok(())
    }
}

/// Which message kinds carry a descriptor.
fn kind_wants_fd(kind: MsgKind) -> bool {
    matches!(
        kind,
        MsgKind::ObjectRequest
            | MsgKind::RawObjectRequest
            | MsgKind::RawObjectOutfd
            | MsgKind::CommitRequest
            | MsgKind::GitconfigParseRequest
            | MsgKind::SendRequest
            | MsgKind::SendPackfd
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, Write};

    #[test]
    fn roundtrip_without_fd() {
        let (mut a, mut b) = Bus::pair().unwrap();
        a.send(&Message::SendUploadProgress { bytes: 8192 }).unwrap();
        let (msg, fd) = b.recv().unwrap();
        assert!(fd.is_none());
        assert!(matches!(msg, Message::SendUploadProgress { bytes: 8192 }));
    }

    #[test]
    fn fifo_ordering() {
        let (mut a, mut b) = Bus::pair().unwrap();
        for bytes in [1u64, 2, 3] {
            a.send(&Message::SendUploadProgress { bytes }).unwrap();
        }
        for expected in [1u64, 2, 3] {
            match b.recv().unwrap().0 {
                Message::SendUploadProgress { bytes } => assert_eq!(bytes, expected),
                other => panic!("wrong message: {other:?}"),
            }
        }
    }

    #[test]
    fn fd_passing() {
        let (mut a, mut b) = Bus::pair().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"over the bus").unwrap();
        file.rewind().unwrap();

        use std::os::fd::AsFd;
        a.send_with_fd(&Message::SendPackfd, file.as_fd()).unwrap();

        let (msg, fd) = b.recv().unwrap();
        assert!(matches!(msg, Message::SendPackfd));
        let mut received = std::fs::File::from(fd.expect("fd attached"));
        let mut content = String::new();
        received.read_to_string(&mut content).unwrap();
        assert_eq!(content, "over the bus");
    }

    #[test]
    fn non_fd_message_does_not_claim_fd() {
        let (mut a, mut b) = Bus::pair().unwrap();
        let file = tempfile::tempfile().unwrap();
        use std::os::fd::AsFd;
        a.send_with_fd(&Message::SendPackfd, file.as_fd()).unwrap();
        a.send(&Message::SendDone).unwrap();

        let (_, fd) = b.recv().unwrap();
        assert!(fd.is_some());
        let (msg, fd) = b.recv().unwrap();
        assert!(matches!(msg, Message::SendDone));
        assert!(fd.is_none());
    }

    #[test]
    fn eof_is_privsep_pipe() {
        let (a, mut b) = Bus::pair().unwrap();
        drop(a);
        assert!(matches!(b.recv(), Err(IpcError::PrivsepPipe)));
    }

    #[test]
    fn recv_expect_mismatch() {
        let (mut a, mut b) = Bus::pair().unwrap();
        a.send(&Message::SendDone).unwrap();
        assert!(matches!(
            b.recv_expect(MsgKind::SendPackfd),
            Err(IpcError::PrivsepMsg)
        ));
    }

    #[test]
    fn recv_expect_stop_is_cancelled() {
        let (mut a, mut b) = Bus::pair().unwrap();
        a.send(&Message::Stop).unwrap();
        assert!(matches!(
            b.recv_expect(MsgKind::SendPackfd),
            Err(IpcError::Cancelled)
        ));
    }
}
