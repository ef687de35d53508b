use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid nonce length: expected {expected} bytes, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("Master key too short: need at least {min} bytes, got {got}")]
    MasterKeyTooShort { min: usize, got: usize },

    #[error("Salt too short: need at least {min} bytes, got {got}")]
    SaltTooShort { min: usize, got: usize },

    #[error("Key ID cannot be empty")]
    EmptyKeyId,

    #[error("Key version must be at least 1, got {0}")]
    InvalidKeyVersion(u32),

    #[error("Nonce cannot be empty")]
    EmptyNonce,

    #[error("Ciphertext cannot be empty")]
    EmptyCiphertext,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(&'static str),

    #[error("Unknown algorithm tag: {0:?}")]
    UnknownAlgorithm(String),

    #[error("Unsupported payload format version: {0}")]
    UnsupportedPayloadVersion(u8),

    #[error("Truncated payload: ran out of bytes reading {field}")]
    TruncatedPayload { field: &'static str },

    #[error("Malformed payload: {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("Malformed payload: {remaining} trailing bytes after timestamp")]
    TrailingBytes { remaining: usize },

    #[error("Payload timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("Ciphertext too short to carry an authentication tag: got {got} bytes, need {min}")]
    CiphertextTooShort { min: usize, got: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}
