//! Supported AEAD algorithms and their canonical wire tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// AEAD algorithms the payload format can name.
///
/// Only AES-256-GCM has a cipher behind it today. CHACHA20-POLY1305 is
/// reserved in the type system and fails closed at cipher construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "CHACHA20-POLY1305")]
    ChaCha20Poly1305,
}

impl Algorithm {
    /// Canonical tag written into the wire format and config files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES-256-GCM",
            Algorithm::ChaCha20Poly1305 => "CHACHA20-POLY1305",
        }
    }

    /// Raw key length in bytes.
    pub const fn key_len(&self) -> usize {
        match self {
            Algorithm::Aes256Gcm => 32,
            Algorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Nonce length in bytes (96 bits for both).
    pub const fn nonce_len(&self) -> usize {
        match self {
            Algorithm::Aes256Gcm => 12,
            Algorithm::ChaCha20Poly1305 => 12,
        }
    }

    /// Authentication tag length in bytes.
    pub const fn tag_len(&self) -> usize {
        match self {
            Algorithm::Aes256Gcm => 16,
            Algorithm::ChaCha20Poly1305 => 16,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES-256-GCM" => Ok(Algorithm::Aes256Gcm),
            "CHACHA20-POLY1305" => Ok(Algorithm::ChaCha20Poly1305),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        for alg in [Algorithm::Aes256Gcm, Algorithm::ChaCha20Poly1305] {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = "AES-128-GCM".parse::<Algorithm>().unwrap_err();
        assert!(err.to_string().contains("Unknown algorithm"));
    }

    #[test]
    fn aes_256_gcm_parameters() {
        let alg = Algorithm::Aes256Gcm;
        assert_eq!(alg.key_len(), 32);
        assert_eq!(alg.nonce_len(), 12);
        assert_eq!(alg.tag_len(), 16);
    }

    #[test]
    fn serde_uses_canonical_tags() {
        let json = serde_json::to_string(&Algorithm::Aes256Gcm).unwrap();
        assert_eq!(json, "\"AES-256-GCM\"");
        let alg: Algorithm = serde_json::from_str("\"CHACHA20-POLY1305\"").unwrap();
        assert_eq!(alg, Algorithm::ChaCha20Poly1305);
    }
}
