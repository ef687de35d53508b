//! Typed configuration view for the encryption subsystem.
//!
//! The application owns loading (file, env, whatever); this crate only
//! defines the shape, the defaults, and validation. Durations are plain
//! seconds so the types deserialize from any config format without
//! helpers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fieldseal_crypto::Algorithm;

use crate::error::{EncryptionError, ErrorKind};

/// Subsystem configuration, consumed by [`ServiceBuilder`](crate::ServiceBuilder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Key-management provider name. Only `"local"` is built in; the name
    /// travels into logs and metrics labels.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// How long a key version stays valid after creation.
    #[serde(default = "default_key_ttl")]
    pub key_ttl_secs: u64,

    /// How often operators are expected to rotate keys. Informational for
    /// schedulers; the subsystem never rotates on its own.
    #[serde(default = "default_rotation_frequency")]
    pub rotation_frequency_secs: u64,

    /// AEAD algorithm for newly created keys.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Maximum plaintext size in bytes accepted by encrypt.
    #[serde(default = "default_max_data_size")]
    pub max_data_size: usize,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Key cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Cache entry TTL, independent of the keys' own expiry clock.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Upper bound on cached entries.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
}

fn default_provider() -> String {
    "local".into()
}
fn default_key_ttl() -> u64 {
    24 * 60 * 60
}
fn default_rotation_frequency() -> u64 {
    7 * 24 * 60 * 60
}
fn default_algorithm() -> Algorithm {
    Algorithm::Aes256Gcm
}
fn default_max_data_size() -> usize {
    1024 * 1024
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    30 * 60
}
fn default_cache_max_size() -> usize {
    1000
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            provider: default_provider(),
            key_ttl_secs: default_key_ttl(),
            rotation_frequency_secs: default_rotation_frequency(),
            algorithm: default_algorithm(),
            max_data_size: default_max_data_size(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
            max_size: default_cache_max_size(),
        }
    }
}

impl EncryptionConfig {
    /// Validate all fields, reporting the first violation.
    pub fn validate(&self) -> Result<(), EncryptionError> {
        if self.provider.trim().is_empty() {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "provider cannot be empty",
            ));
        }
        if self.key_ttl_secs == 0 {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "key_ttl_secs must be greater than zero",
            ));
        }
        if self.rotation_frequency_secs == 0 {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "rotation_frequency_secs must be greater than zero",
            ));
        }
        if self.max_data_size == 0 {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "max_data_size must be greater than zero",
            ));
        }
        if self.cache.enabled {
            if self.cache.ttl_secs == 0 {
                return Err(EncryptionError::new(
                    ErrorKind::InvalidInput,
                    "cache.ttl_secs must be greater than zero when the cache is enabled",
                ));
            }
            if self.cache.max_size == 0 {
                return Err(EncryptionError::new(
                    ErrorKind::InvalidInput,
                    "cache.max_size must be greater than zero when the cache is enabled",
                ));
            }
        }
        Ok(())
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }

    pub fn rotation_frequency(&self) -> Duration {
        Duration::from_secs(self.rotation_frequency_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
