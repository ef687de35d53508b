//! Field-sealing primitives: AES-256-GCM AEAD, Argon2id key derivation, versioned keys, and the encrypted payload wire codec.

pub mod aead;
pub mod algorithm;
pub mod error;
pub mod kdf;
pub mod key;
pub mod payload;

pub use aead::{build_aad, generate_nonce, open, seal};
pub use algorithm::Algorithm;
pub use error::CryptoError;
pub use kdf::{derive_key, DERIVED_KEY_LEN, MIN_MASTER_KEY_LEN, MIN_SALT_LEN};
pub use key::{EncryptionKey, KeyId, KeyMaterial};
pub use payload::{EncryptedPayload, FORMAT_VERSION};
