//! Encrypted-field aggregate.
//!
//! A `FieldEncryption` ties a caller-supplied field ID (say `user-123`)
//! and a field name label (`email`) to the current [`EncryptedPayload`].
//! Payload, version counter, and update timestamp change together under
//! one write lock; nothing outside this type touches the version.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use fieldseal_crypto::EncryptedPayload;

use crate::error::{EncryptionError, ErrorKind};

/// Upper bound on field IDs and field names, in characters.
pub const MAX_FIELD_INPUT_LEN: usize = 255;

pub(crate) fn validate_field_input(id: &str, field_name: &str) -> Result<(), EncryptionError> {
    if id.is_empty() {
        return Err(EncryptionError::new(
            ErrorKind::InvalidInput,
            "field ID cannot be empty",
        ));
    }
    if field_name.is_empty() {
        return Err(EncryptionError::new(
            ErrorKind::InvalidInput,
            "field name cannot be empty",
        ));
    }
    if id.chars().count() > MAX_FIELD_INPUT_LEN {
        return Err(
            EncryptionError::new(ErrorKind::InvalidInput, "field ID too long")
                .with_context("length", id.chars().count())
                .with_context("max_length", MAX_FIELD_INPUT_LEN),
        );
    }
    if field_name.chars().count() > MAX_FIELD_INPUT_LEN {
        return Err(
            EncryptionError::new(ErrorKind::InvalidInput, "field name too long")
                .with_context("length", field_name.chars().count())
                .with_context("max_length", MAX_FIELD_INPUT_LEN),
        );
    }
    Ok(())
}

#[derive(Debug)]
struct FieldState {
    payload: EncryptedPayload,
    version: u64,
    updated_at: DateTime<Utc>,
}

/// One protected field value and its revision counter.
#[derive(Debug)]
pub struct FieldEncryption {
    id: String,
    field_name: String,
    created_at: DateTime<Utc>,
    state: RwLock<FieldState>,
}

impl FieldEncryption {
    pub fn new(
        id: impl Into<String>,
        field_name: impl Into<String>,
        payload: EncryptedPayload,
    ) -> Result<Self, EncryptionError> {
        let id = id.into();
        let field_name = field_name.into();
        validate_field_input(&id, &field_name)?;

        let now = Utc::now();
        Ok(FieldEncryption {
            id,
            field_name,
            created_at: now,
            state: RwLock::new(FieldState {
                payload,
                version: 1,
                updated_at: now,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> EncryptedPayload {
        self.state.read().payload.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state.read().updated_at
    }

    /// Install a replacement payload, bumping the version by exactly one
    /// and refreshing the update timestamp in the same critical section.
    pub fn update_payload(&self, payload: EncryptedPayload) {
        let mut state = self.state.write();
        state.payload = payload;
        state.version += 1;
        state.updated_at = Utc::now();
    }
}
