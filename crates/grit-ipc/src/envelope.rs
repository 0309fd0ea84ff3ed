use crate::IpcError;

/// Wire size of the message envelope.
pub const ENVELOPE_LEN: usize = 18;

/// Maximum total message length (envelope + payload).
pub const MAX_MSG_LEN: usize = 16384;

/// The fixed message header.
///
/// `len` counts the envelope itself plus the payload; a received `len`
/// smaller than the envelope is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub kind: u32,
    pub flags: u32,
    pub peer: u32,
    pub pid: u32,
    pub len: u16,
}

impl Envelope {
    pub fn new(kind: u32, payload_len: usize) -> Result<Self, IpcError> {
        let total = ENVELOPE_LEN + payload_len;
        if total > MAX_MSG_LEN {
            return Err(IpcError::NoSpace);
        }
        Ok(Self {
            kind,
            flags: 0,
            peer: 0,
            pid: std::process::id(),
            len: total as u16,
        })
    }

    pub fn encode(&self) -> [u8; ENVELOPE_LEN] {
        let mut buf = [0u8; ENVELOPE_LEN];
        buf[0..4].copy_from_slice(&self.kind.to_le_bytes());
        buf[4..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..12].copy_from_slice(&self.peer.to_le_bytes());
        buf[12..16].copy_from_slice(&self.pid.to_le_bytes());
        buf[16..18].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IpcError> {
        if buf.len() < ENVELOPE_LEN {
            return Err(IpcError::PrivsepLen);
        }
        let envelope = Self {
            kind: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            peer: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            pid: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            len: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
        };
        if (envelope.len as usize) < ENVELOPE_LEN {
            return Err(IpcError::PrivsepLen);
        }
        Ok(envelope)
    }

    /// Payload length implied by `len`.
    pub fn payload_len(&self) -> usize {
        self.len as usize - ENVELOPE_LEN
    }
}
