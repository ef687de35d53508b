//! Versioned symmetric key value objects.
//!
//! A key is identified by `(KeyId, version)`. Material is held in
//! [`KeyMaterial`], which zeroes itself on drop and never appears in
//! `Debug` output. Public accessors hand out defensive copies only.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use zeroize::Zeroize;

use crate::algorithm::Algorithm;
use crate::error::CryptoError;

/// Logical key identifier, e.g. `"default"` or `"payments"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        KeyId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        KeyId(s.to_string())
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        KeyId(s)
    }
}

/// Raw secret key bytes. Zeroed on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        KeyMaterial { bytes }
    }

    /// Fresh random material of the given length.
    pub fn generate(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; len];
        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
        Ok(KeyMaterial { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Defensive copy of the raw bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Overwrite the material with zeros in place.
    pub fn erase(&mut self) {
        self.bytes.zeroize();
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([REDACTED; {}])", self.bytes.len())
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// An immutable versioned encryption key.
///
/// Created by derivation or generation, stored once, never mutated.
/// Rotation supersedes a key with a new version; it never touches old ones.
#[derive(Debug, Clone)]
pub struct EncryptionKey {
    id: KeyId,
    version: u32,
    material: KeyMaterial,
    algorithm: Algorithm,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl EncryptionKey {
    /// Build a key, validating identity and material length for the algorithm.
    pub fn new(
        id: KeyId,
        version: u32,
        material: KeyMaterial,
        algorithm: Algorithm,
        ttl: Duration,
    ) -> Result<Self, CryptoError> {
        if id.is_empty() {
            return Err(CryptoError::EmptyKeyId);
        }
        if version == 0 {
            return Err(CryptoError::InvalidKeyVersion(version));
        }
        if material.len() != algorithm.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: algorithm.key_len(),
                got: material.len(),
            });
        }
        let created_at = Utc::now();
        Ok(EncryptionKey {
            id,
            version,
            material,
            algorithm,
            created_at,
            expires_at: created_at + ttl,
        })
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Pure function of `now` vs `expires_at`.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Defensive copy of the key bytes. Never hands out a shared reference.
    pub fn material(&self) -> Vec<u8> {
        self.material.to_vec()
    }

    /// Zero the key bytes in place. Drop does this too; this is for callers
    /// that want the wipe to happen before the value goes out of scope.
    pub fn erase(&mut self) {
        self.material.erase();
    }

    pub(crate) fn material_ref(&self) -> &KeyMaterial {
        &self.material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_material() -> KeyMaterial {
        KeyMaterial::generate(32).unwrap()
    }

    #[test]
    fn new_key_has_expected_identity() {
        let key = EncryptionKey::new(
            KeyId::from("orders"),
            3,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(24),
        )
        .unwrap();
        assert_eq!(key.id().as_str(), "orders");
        assert_eq!(key.version(), 3);
        assert_eq!(key.algorithm(), Algorithm::Aes256Gcm);
        assert!(!key.is_expired());
    }

    #[test]
    fn rejects_empty_key_id() {
        let err = EncryptionKey::new(
            KeyId::from(""),
            1,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Key ID"));
    }

    #[test]
    fn rejects_version_zero() {
        let err = EncryptionKey::new(
            KeyId::from("k"),
            0,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn rejects_wrong_material_length() {
        let err = EncryptionKey::new(
            KeyId::from("k"),
            1,
            KeyMaterial::generate(16).unwrap(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid key length"));
    }

    #[test]
    fn negative_ttl_is_immediately_expired() {
        let key = EncryptionKey::new(
            KeyId::from("k"),
            1,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::seconds(-1),
        )
        .unwrap();
        assert!(key.is_expired());
    }

    #[test]
    fn material_accessor_returns_copies() {
        let key = EncryptionKey::new(
            KeyId::from("k"),
            1,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap();
        let a = key.material();
        let b = key.material();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn erase_zeroes_material() {
        let mut key = EncryptionKey::new(
            KeyId::from("k"),
            1,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap();
        key.erase();
        assert_eq!(key.material(), vec![0u8; 32]);
    }

    #[test]
    fn debug_redacts_material() {
        let key = EncryptionKey::new(
            KeyId::from("k"),
            1,
            random_material(),
            Algorithm::Aes256Gcm,
            Duration::hours(1),
        )
        .unwrap();
        let dump = format!("{key:?}");
        assert!(dump.contains("REDACTED"));
        assert!(!dump.contains(&hex::encode(key.material())));
    }

    #[test]
    fn generated_material_is_random() {
        let a = KeyMaterial::generate(32).unwrap();
        let b = KeyMaterial::generate(32).unwrap();
        assert_ne!(a.to_vec(), b.to_vec());
    }
}
