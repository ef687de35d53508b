//! AEAD seal/open with key-identity binding.
//!
//! The AAD is the exact byte string `field-encryption:<keyID>:<keyVersion>`.
//! It is authenticated but not encrypted, so a ciphertext moved under a
//! different key identity fails to open even if the raw key bytes match.
//! The string must never change: existing ciphertexts authenticate against
//! it.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::algorithm::Algorithm;
use crate::error::CryptoError;
use crate::key::{EncryptionKey, KeyId};

/// Build the additional authenticated data for a key identity.
pub fn build_aad(key_id: &KeyId, key_version: u32) -> Vec<u8> {
    format!("field-encryption:{key_id}:{key_version}").into_bytes()
}

/// Generate a fresh random nonce of the algorithm's required length.
///
/// Every seal call needs a new one; nonce reuse under the same key breaks
/// AES-GCM completely.
pub fn generate_nonce(algorithm: Algorithm) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = vec![0u8; algorithm.nonce_len()];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key` with the given nonce and AAD.
///
/// Returns ciphertext with the authentication tag appended. Only
/// AES-256-GCM is implemented; the reserved algorithm fails closed.
pub fn seal(
    key: &EncryptionKey,
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key, CryptoError::EncryptionFailed)?;
    check_nonce_len(key.algorithm(), nonce)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt `ciphertext` under `key` with the given nonce and AAD.
///
/// Any authentication failure (tampered ciphertext, wrong key, wrong AAD)
/// is reported uniformly; no partial plaintext escapes.
pub fn open(
    key: &EncryptionKey,
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key, CryptoError::DecryptionFailed)?;
    check_nonce_len(key.algorithm(), nonce)?;
    if ciphertext.len() < key.algorithm().tag_len() {
        return Err(CryptoError::CiphertextTooShort {
            min: key.algorithm().tag_len(),
            got: ciphertext.len(),
        });
    }
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

fn build_cipher(
    key: &EncryptionKey,
    wrap: fn(String) -> CryptoError,
) -> Result<Aes256Gcm, CryptoError> {
    match key.algorithm() {
        Algorithm::Aes256Gcm => {
            Aes256Gcm::new_from_slice(key.material_ref().expose()).map_err(|e| wrap(e.to_string()))
        }
        Algorithm::ChaCha20Poly1305 => Err(CryptoError::UnsupportedAlgorithm(
            Algorithm::ChaCha20Poly1305.as_str(),
        )),
    }
}

fn check_nonce_len(algorithm: Algorithm, nonce: &[u8]) -> Result<(), CryptoError> {
    if nonce.len() != algorithm.nonce_len() {
        return Err(CryptoError::InvalidNonceLength {
            expected: algorithm.nonce_len(),
            got: nonce.len(),
        });
    }
    Ok(())
}
