//! Self-describing ciphertext envelope and its binary wire format.
//!
//! Wire format v1 (big-endian, length prefixes are u32):
//! [1 byte: format version=1]
//! [4 bytes: keyID len][keyID UTF-8]
//! [4 bytes: keyVersion]
//! [4 bytes: algorithm len][algorithm tag UTF-8]
//! [4 bytes: nonce len][nonce]
//! [4 bytes: ciphertext len][ciphertext + tag]
//! [8 bytes: created-at Unix seconds, signed]
//!
//! The format must stay byte-stable across releases: payloads written by
//! one process restart must parse in the next. Truncation at any field is
//! an error, never a panic or an out-of-bounds read.

use chrono::{DateTime, Utc};

use crate::algorithm::Algorithm;
use crate::error::CryptoError;
use crate::key::KeyId;

/// Current payload format version byte.
pub const FORMAT_VERSION: u8 = 1;

/// An encrypted field value, bound to the exact key that produced it.
///
/// The `(key_id, key_version, algorithm)` triple pins which key must be
/// fetched to decrypt. That binding is immutable; rotation produces a new
/// payload rather than upgrading this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    key_id: KeyId,
    key_version: u32,
    algorithm: Algorithm,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl EncryptedPayload {
    /// Build a payload from freshly sealed parts.
    ///
    /// The creation timestamp is captured at second precision, matching
    /// what the wire format can carry.
    pub fn new(
        key_id: KeyId,
        key_version: u32,
        algorithm: Algorithm,
        nonce: Vec<u8>,
        ciphertext: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        if key_id.is_empty() {
            return Err(CryptoError::EmptyKeyId);
        }
        if key_version == 0 {
            return Err(CryptoError::InvalidKeyVersion(key_version));
        }
        if nonce.is_empty() {
            return Err(CryptoError::EmptyNonce);
        }
        if ciphertext.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }
        let secs = Utc::now().timestamp();
        let created_at =
            DateTime::from_timestamp(secs, 0).ok_or(CryptoError::InvalidTimestamp(secs))?;
        Ok(EncryptedPayload {
            key_id,
            key_version,
            algorithm,
            nonce,
            ciphertext,
            created_at,
        })
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serialize to the v1 wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let id = self.key_id.as_str().as_bytes();
        let alg = self.algorithm.as_str().as_bytes();
        let mut out = Vec::with_capacity(
            1 + 4 + id.len() + 4 + 4 + alg.len() + 4 + self.nonce.len() + 4
                + self.ciphertext.len()
                + 8,
        );
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&(id.len() as u32).to_be_bytes());
        out.extend_from_slice(id);
        out.extend_from_slice(&self.key_version.to_be_bytes());
        out.extend_from_slice(&(alg.len() as u32).to_be_bytes());
        out.extend_from_slice(alg);
        out.extend_from_slice(&(self.nonce.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.created_at.timestamp().to_be_bytes());
        out
    }

    /// Parse the v1 wire format.
    ///
    /// Rejects any other format version, truncation at any field, trailing
    /// bytes, and unknown algorithm tags. Field-level content (empty nonce,
    /// empty key ID) is accepted here; it fails later at decryption or key
    /// lookup, keeping the codec total over well-framed input.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        let mut r = Reader::new(data);

        let version = r.read_u8("format version")?;
        if version != FORMAT_VERSION {
            return Err(CryptoError::UnsupportedPayloadVersion(version));
        }

        let key_id = String::from_utf8(r.read_len_prefixed("keyID")?.to_vec())
            .map_err(|_| CryptoError::InvalidUtf8 { field: "keyID" })?;
        let key_version = r.read_u32("keyVersion")?;
        let alg_bytes = r.read_len_prefixed("algorithm")?;
        let algorithm: Algorithm = std::str::from_utf8(alg_bytes)
            .map_err(|_| CryptoError::InvalidUtf8 { field: "algorithm" })?
            .parse()?;
        let nonce = r.read_len_prefixed("nonce")?.to_vec();
        let ciphertext = r.read_len_prefixed("ciphertext")?.to_vec();
        let secs = r.read_i64("timestamp")?;
        let created_at =
            DateTime::from_timestamp(secs, 0).ok_or(CryptoError::InvalidTimestamp(secs))?;

        if r.remaining() > 0 {
            return Err(CryptoError::TrailingBytes {
                remaining: r.remaining(),
            });
        }

        Ok(EncryptedPayload {
            key_id: KeyId::from(key_id),
            key_version,
            algorithm,
            nonce,
            ciphertext,
            created_at,
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CryptoError> {
        if self.remaining() < n {
            return Err(CryptoError::TruncatedPayload { field });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, CryptoError> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, CryptoError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i64(&mut self, field: &'static str) -> Result<i64, CryptoError> {
        let bytes = self.take(8, field)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(buf))
    }

    fn read_len_prefixed(&mut self, field: &'static str) -> Result<&'a [u8], CryptoError> {
        let len = self.read_u32(field)? as usize;
        self.take(len, field)
    }
}
