//! Canonical coded errors for the encryption subsystem.
//!
//! Callers branch on [`ErrorKind`], not on message text. Every error
//! carries a message, an optional wrapped cause, and a structured context
//! map for observability. Context holds identifiers and sizes only; key
//! material never goes in.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use fieldseal_crypto::CryptoError;

/// Stable error codes, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    KeyNotFound,
    EncryptionFailed,
    DecryptionFailed,
    InvalidAlgorithm,
    KeyRotationFailed,
    DataTooLarge,
    InvalidEncryption,
    ServiceUnavailable,
}

impl ErrorKind {
    /// Canonical wire/log representation of the code.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::KeyNotFound => "KEY_NOT_FOUND",
            ErrorKind::EncryptionFailed => "ENCRYPTION_FAILED",
            ErrorKind::DecryptionFailed => "DECRYPTION_FAILED",
            ErrorKind::InvalidAlgorithm => "INVALID_ALGORITHM",
            ErrorKind::KeyRotationFailed => "KEY_ROTATION_FAILED",
            ErrorKind::DataTooLarge => "DATA_TOO_LARGE",
            ErrorKind::InvalidEncryption => "INVALID_ENCRYPTION",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A coded error with message, optional cause, and context map.
///
/// `Display` is `CODE: message`; the cause is reachable through
/// `Error::source()` and the context map through [`context`](Self::context).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct EncryptionError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    context: BTreeMap<String, String>,
}

impl EncryptionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EncryptionError {
            kind,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry. Values go through `Display`, so versions and
    /// sizes can be passed directly.
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }
}

impl From<CryptoError> for EncryptionError {
    fn from(err: CryptoError) -> Self {
        let kind = match &err {
            CryptoError::InvalidKeyLength { .. }
            | CryptoError::InvalidNonceLength { .. }
            | CryptoError::MasterKeyTooShort { .. }
            | CryptoError::SaltTooShort { .. }
            | CryptoError::EmptyKeyId
            | CryptoError::InvalidKeyVersion(_)
            | CryptoError::EmptyNonce
            | CryptoError::EmptyCiphertext => ErrorKind::InvalidInput,
            CryptoError::UnsupportedAlgorithm(_) => ErrorKind::InvalidAlgorithm,
            CryptoError::UnknownAlgorithm(_)
            | CryptoError::UnsupportedPayloadVersion(_)
            | CryptoError::TruncatedPayload { .. }
            | CryptoError::InvalidUtf8 { .. }
            | CryptoError::TrailingBytes { .. }
            | CryptoError::InvalidTimestamp(_) => ErrorKind::InvalidEncryption,
            CryptoError::CiphertextTooShort { .. } | CryptoError::DecryptionFailed(_) => {
                ErrorKind::DecryptionFailed
            }
            CryptoError::EncryptionFailed(_)
            | CryptoError::KdfFailed(_)
            | CryptoError::RngFailed(_) => ErrorKind::EncryptionFailed,
        };
        let message = err.to_string();
        EncryptionError::new(kind, message).with_source(err)
    }
}
