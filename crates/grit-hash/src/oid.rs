use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_encode};
use crate::{HashError, DIGEST_LEN, HEX_LEN};

/// An object identifier — the 20-byte SHA-1 of an object's serialised form.
///
/// Equality and ordering are byte-lexicographic, matching the sort order of
/// pack index id tables. The string form is 40 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; DIGEST_LEN]);

impl ObjectId {
    /// The null id (all zeros), used on the wire for ref creation/deletion.
    pub const NULL: Self = Self([0u8; DIGEST_LEN]);

    /// Create an ObjectId from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != DIGEST_LEN {
            return Err(HashError::InvalidDigestLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Parse from a 40-digit hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != HEX_LEN {
            return Err(HashError::InvalidHexLength {
                expected: HEX_LEN,
                actual: hex.len(),
            });
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Is this the all-zeros id?
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    /// First digest byte, the fanout table index.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Does the hex form start with `prefix` (case-insensitive)?
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }

    /// Loose object path component: `"xx/yyyy..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
