//! Versioned key storage.
//!
//! Keys live under `(keyID, version)`. Rotation only ever appends a new
//! version; old versions stay put so old ciphertexts keep decrypting.
//! Expired keys are invisible to lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use zeroize::Zeroize;

use fieldseal_crypto::{derive_key, Algorithm, EncryptionKey, KeyId, KeyMaterial};

use crate::cancel::CancelToken;
use crate::error::{EncryptionError, ErrorKind};
use crate::metrics::MetricsSink;

/// Key identifier substituted when callers pass an empty one.
pub const DEFAULT_KEY_ID: &str = "default";

/// Salt for the seeded default key. Deployments are expected to override
/// the seed by storing their own keys; the name says so on purpose.
const SEED_SALT: &[u8] = b"default-salt-change-in-production";

/// Storage and rotation of versioned encryption keys.
pub trait KeyRepository: Send + Sync {
    /// Fetch an exact `(keyID, version)` pair. Absent or expired keys are
    /// both `KEY_NOT_FOUND`.
    fn get_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
        version: u32,
    ) -> Result<EncryptionKey, EncryptionError>;

    /// Fetch the highest non-expired version for `keyID`.
    fn get_latest_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError>;

    /// Store a key under its `(id, version)`. Overwrites an existing pair.
    fn store_key(&self, ctx: &CancelToken, key: EncryptionKey) -> Result<(), EncryptionError>;

    /// Mint and store version `max+1` for `keyID` (1 if none exist yet).
    /// Never touches prior versions.
    fn rotate_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError>;

    /// All non-expired keys, grouped by key id.
    fn list_keys(
        &self,
        ctx: &CancelToken,
    ) -> Result<HashMap<KeyId, Vec<EncryptionKey>>, EncryptionError>;

    fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError>;
}

/// In-memory key store guarded by a single reader/writer lock.
///
/// Seeded at construction with a `"default"` key at version 1, derived
/// from the master key. Rotation derives fresh material from random input
/// through the KDF, keeping domain separation in the rotation path.
pub struct InMemoryKeyRepository {
    keys: RwLock<HashMap<KeyId, HashMap<u32, EncryptionKey>>>,
    algorithm: Algorithm,
    key_ttl: chrono::Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for InMemoryKeyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyRepository").finish_non_exhaustive()
    }
}

impl InMemoryKeyRepository {
    /// Build a repository seeded with the default key.
    ///
    /// Fails `INVALID_INPUT` when the master key is shorter than the KDF
    /// minimum. The master key is not retained.
    pub fn new(
        master_key: &[u8],
        algorithm: Algorithm,
        key_ttl: chrono::Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, EncryptionError> {
        let default_id = KeyId::from(DEFAULT_KEY_ID);
        let material = derive_key(master_key, SEED_SALT, &default_id)?;
        let default_key = EncryptionKey::new(default_id.clone(), 1, material, algorithm, key_ttl)?;

        let mut keys = HashMap::new();
        keys.insert(default_id, HashMap::from([(1, default_key)]));

        Ok(InMemoryKeyRepository {
            keys: RwLock::new(keys),
            algorithm,
            key_ttl,
            metrics,
        })
    }
}

impl KeyRepository for InMemoryKeyRepository {
    fn get_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
        version: u32,
    ) -> Result<EncryptionKey, EncryptionError> {
        ctx.check("get_key")?;
        let keys = self.keys.read();
        let versions = keys.get(key_id).ok_or_else(|| {
            EncryptionError::new(ErrorKind::KeyNotFound, "key ID not found")
                .with_context("key_id", key_id)
        })?;
        let key = versions.get(&version).ok_or_else(|| {
            EncryptionError::new(ErrorKind::KeyNotFound, "key version not found")
                .with_context("key_id", key_id)
                .with_context("key_version", version)
        })?;
        if key.is_expired() {
            return Err(EncryptionError::new(ErrorKind::KeyNotFound, "key expired")
                .with_context("key_id", key_id)
                .with_context("key_version", version));
        }
        Ok(key.clone())
    }

    fn get_latest_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError> {
        ctx.check("get_latest_key")?;
        let keys = self.keys.read();
        let versions = keys.get(key_id).ok_or_else(|| {
            EncryptionError::new(ErrorKind::KeyNotFound, "key ID not found")
                .with_context("key_id", key_id)
        })?;
        versions
            .values()
            .filter(|key| !key.is_expired())
            .max_by_key(|key| key.version())
            .cloned()
            .ok_or_else(|| {
                EncryptionError::new(ErrorKind::KeyNotFound, "no valid key versions")
                    .with_context("key_id", key_id)
            })
    }

    fn store_key(&self, ctx: &CancelToken, key: EncryptionKey) -> Result<(), EncryptionError> {
        ctx.check("store_key")?;
        let mut keys = self.keys.write();
        tracing::debug!(key_id = %key.id(), version = key.version(), "key stored");
        keys.entry(key.id().clone())
            .or_default()
            .insert(key.version(), key);
        Ok(())
    }

    fn rotate_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError> {
        ctx.check("rotate_key")?;
        let mut keys = self.keys.write();
        let max_version = keys
            .get(key_id)
            .map(|versions| versions.keys().copied().max().unwrap_or(0))
            .unwrap_or(0);
        let new_version = max_version + 1;

        let salt = format!("rotation-salt-{key_id}-{new_version}");
        let ikm = KeyMaterial::generate(32).map_err(EncryptionError::from)?;
        let mut ikm_bytes = ikm.to_vec();
        let derived = derive_key(&ikm_bytes, salt.as_bytes(), key_id);
        ikm_bytes.zeroize();
        let material = derived?;

        let new_key = EncryptionKey::new(
            key_id.clone(),
            new_version,
            material,
            self.algorithm,
            self.key_ttl,
        )
        .map_err(|e| {
            EncryptionError::new(ErrorKind::KeyRotationFailed, "failed to build rotated key")
                .with_context("key_id", key_id)
                .with_context("key_version", new_version)
                .with_source(e)
        })?;

        keys.entry(key_id.clone())
            .or_default()
            .insert(new_version, new_key.clone());

        tracing::info!(key_id = %key_id, new_version, "key rotated");
        self.metrics.record_key_rotation(key_id);
        Ok(new_key)
    }

    fn list_keys(
        &self,
        ctx: &CancelToken,
    ) -> Result<HashMap<KeyId, Vec<EncryptionKey>>, EncryptionError> {
        ctx.check("list_keys")?;
        let keys = self.keys.read();
        let mut result: HashMap<KeyId, Vec<EncryptionKey>> = HashMap::new();
        for (id, versions) in keys.iter() {
            for key in versions.values() {
                if !key.is_expired() {
                    result.entry(id.clone()).or_default().push(key.clone());
                }
            }
        }
        Ok(result)
    }

    fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError> {
        ctx.check("health_check")?;
        if self.keys.read().is_empty() {
            return Err(EncryptionError::new(
                ErrorKind::ServiceUnavailable,
                "no keys available",
            ));
        }
        Ok(())
    }
}
