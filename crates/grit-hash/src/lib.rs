//! Object identity for the grit repository engine.
//!
//! Every object is addressed by the SHA-1 of its canonical serialisation
//! (`"<type> <size>\0<payload>"`). This crate provides the id type, the
//! hex codec, and a streaming hasher with collision detection.

pub mod hasher;
mod hex;
mod oid;

pub use hasher::Hasher;
pub use hex::{hex_decode, hex_encode};
pub use oid::ObjectId;

/// Length of a raw object id in bytes.
pub const DIGEST_LEN: usize = 20;

/// Length of an object id in hex form.
pub const HEX_LEN: usize = 2 * DIGEST_LEN;

/// Errors from hashing and id parsing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid object id length: expected {expected} hex digits, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex digit {byte:#04x} at position {pos}")]
    InvalidHex { byte: u8, pos: usize },

    #[error("invalid object id length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("SHA-1 collision attack detected")]
    Sha1Collision,
}
