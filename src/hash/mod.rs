// Content hashing for git objects and pack streams.
//
// An object id is the SHA-1 digest of an object's full header-prefixed
// encoding. The same 20-byte digest is used as the pack trailer, computed
// over every byte that precedes it.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Raw digest length in bytes.
pub const ID_LEN: usize = 20;

/// Hex-rendered digest length.
pub const HEX_LEN: usize = 40;

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// A 160-bit content hash.
///
/// Rendered as 40 lowercase hex characters in text contexts (commit and tag
/// fields) and embedded as the raw 20 bytes in binary ones (tree entries,
/// reference-delta bases, pack trailers).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an id from a slice, which must be exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ID_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 40-digit hex string.
    pub fn from_hex(s: &str) -> Result<Self, ParseIdError> {
        if s.len() != HEX_LEN {
            return Err(ParseIdError::InvalidLength(s.len()));
        }
        let mut raw = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut raw).map_err(|_| ParseIdError::InvalidHex)?;
        Ok(Self(raw))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("object id must be {HEX_LEN} hex digits, got {0} characters")]
    InvalidLength(usize),
    #[error("object id contains non-hex characters")]
    InvalidHex,
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// Digest a complete byte string.
pub fn digest(data: &[u8]) -> ObjectId {
    digest_parts(&[data])
}

/// Digest the concatenation of `parts` without materializing it.
pub fn digest_parts(parts: &[&[u8]]) -> ObjectId {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    finalize(hasher)
}

fn finalize(hasher: Sha1) -> ObjectId {
    let mut raw = [0u8; ID_LEN];
    raw.copy_from_slice(&hasher.finalize());
    ObjectId(raw)
}

// ---------------------------------------------------------------------------
// HashingWriter
// ---------------------------------------------------------------------------

/// A `Write` adapter that digests every byte as it is handed to the sink.
///
/// Used by the pack writer so the trailer is computed while entries are
/// produced rather than in a second pass over the output.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha1,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
            written: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Digest of everything written so far.
    pub fn digest(&self) -> ObjectId {
        finalize(self.hasher.clone())
    }

    /// Split into the underlying sink and the final digest.
    pub fn into_parts(self) -> (W, ObjectId) {
        (self.inner, finalize(self.hasher))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
