//! Persistence port for encrypted-field aggregates, plus the in-memory
//! implementation used by default.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::error::{EncryptionError, ErrorKind};
use crate::field::FieldEncryption;

/// Storage abstraction for [`FieldEncryption`] aggregates. Aggregates are
/// shared as `Arc` so an in-place `update_payload` is visible to every
/// holder without a re-read.
pub trait FieldEncryptionRepository: Send + Sync {
    fn save(&self, ctx: &CancelToken, field: Arc<FieldEncryption>) -> Result<(), EncryptionError>;

    fn find_by_id(
        &self,
        ctx: &CancelToken,
        id: &str,
    ) -> Result<Arc<FieldEncryption>, EncryptionError>;

    /// All aggregates labeled with `field_name`. An empty result is not
    /// an error.
    fn find_by_field_name(
        &self,
        ctx: &CancelToken,
        field_name: &str,
    ) -> Result<Vec<Arc<FieldEncryption>>, EncryptionError>;

    fn delete(&self, ctx: &CancelToken, id: &str) -> Result<(), EncryptionError>;

    fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFieldRepository {
    fields: RwLock<HashMap<String, Arc<FieldEncryption>>>,
}

impl InMemoryFieldRepository {
    pub fn new() -> Self {
        InMemoryFieldRepository::default()
    }

    fn missing(id: &str) -> EncryptionError {
        EncryptionError::new(ErrorKind::ServiceUnavailable, "field not found")
            .with_context("field_id", id)
    }
}

impl FieldEncryptionRepository for InMemoryFieldRepository {
    fn save(&self, ctx: &CancelToken, field: Arc<FieldEncryption>) -> Result<(), EncryptionError> {
        ctx.check("save")?;
        let id = field.id().to_string();
        tracing::debug!(field_id = %id, field_name = %field.field_name(), "field saved");
        self.fields.write().insert(id, field);
        Ok(())
    }

    fn find_by_id(
        &self,
        ctx: &CancelToken,
        id: &str,
    ) -> Result<Arc<FieldEncryption>, EncryptionError> {
        ctx.check("find_by_id")?;
        if id.is_empty() {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "field ID cannot be empty",
            ));
        }
        self.fields
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::missing(id))
    }

    fn find_by_field_name(
        &self,
        ctx: &CancelToken,
        field_name: &str,
    ) -> Result<Vec<Arc<FieldEncryption>>, EncryptionError> {
        ctx.check("find_by_field_name")?;
        if field_name.is_empty() {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "field name cannot be empty",
            ));
        }
        let fields = self.fields.read();
        Ok(fields
            .values()
            .filter(|field| field.field_name() == field_name)
            .cloned()
            .collect())
    }

    fn delete(&self, ctx: &CancelToken, id: &str) -> Result<(), EncryptionError> {
        ctx.check("delete")?;
        if id.is_empty() {
            return Err(EncryptionError::new(
                ErrorKind::InvalidInput,
                "field ID cannot be empty",
            ));
        }
        if self.fields.write().remove(id).is_none() {
            return Err(Self::missing(id));
        }
        tracing::debug!(field_id = %id, "field deleted");
        Ok(())
    }

    fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError> {
        ctx.check("health_check")?;
        let _ = self.fields.read().len();
        Ok(())
    }
}
