//! Argon2id key derivation with per-key-ID domain separation.
//!
//! Cost parameters are fixed for the deployment, not caller-tunable:
//! time cost 1, memory 64 MiB, 4 lanes, 32-byte output. The effective
//! salt is `salt || keyID` so one master key and salt yield a distinct
//! key per logical key identifier.

use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::key::{KeyId, KeyMaterial};

/// Minimum master key length in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;
/// Minimum caller-supplied salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;
/// Derived key length in bytes (256-bit).
pub const DERIVED_KEY_LEN: usize = 32;

const TIME_COST: u32 = 1;
const MEMORY_KIB: u32 = 64 * 1024;
const LANES: u32 = 4;

/// Derive a 256-bit key from a master secret, a salt, and a key identifier.
pub fn derive_key(
    master_key: &[u8],
    salt: &[u8],
    key_id: &KeyId,
) -> Result<KeyMaterial, CryptoError> {
    if master_key.len() < MIN_MASTER_KEY_LEN {
        return Err(CryptoError::MasterKeyTooShort {
            min: MIN_MASTER_KEY_LEN,
            got: master_key.len(),
        });
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::SaltTooShort {
            min: MIN_SALT_LEN,
            got: salt.len(),
        });
    }

    let params = Params::new(MEMORY_KIB, TIME_COST, LANES, Some(DERIVED_KEY_LEN))
        .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    let argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params);

    let mut salted = Vec::with_capacity(salt.len() + key_id.as_str().len());
    salted.extend_from_slice(salt);
    salted.extend_from_slice(key_id.as_str().as_bytes());

    let mut out = [0u8; DERIVED_KEY_LEN];
    let result = argon2
        .hash_password_into(master_key, &salted, &mut out)
        .map_err(|e| CryptoError::KdfFailed(e.to_string()));
    if let Err(e) = result {
        out.zeroize();
        return Err(e);
    }

    let material = KeyMaterial::new(out.to_vec());
    out.zeroize();
    Ok(material)
}
