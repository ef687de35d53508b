//! Application service tying field aggregates to the encryption core.
//!
//! Every operation validates caller input, delegates crypto to
//! [`EncryptionService`], and persists through the
//! [`FieldEncryptionRepository`] port.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::error::{EncryptionError, ErrorKind};
use crate::field::{validate_field_input, FieldEncryption};
use crate::field_store::FieldEncryptionRepository;
use crate::service::EncryptionService;

/// One field to protect in a bulk call.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub id: String,
    pub name: String,
    pub plaintext: String,
}

pub struct FieldEncryptionService {
    encryption: Arc<EncryptionService>,
    fields: Arc<dyn FieldEncryptionRepository>,
}

impl std::fmt::Debug for FieldEncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryptionService").finish_non_exhaustive()
    }
}

impl FieldEncryptionService {
    pub fn new(
        encryption: Arc<EncryptionService>,
        fields: Arc<dyn FieldEncryptionRepository>,
    ) -> Self {
        FieldEncryptionService { encryption, fields }
    }

    /// Encrypt `plaintext` and persist it as a new (or replacement)
    /// aggregate under `id`/`field_name`.
    pub fn encrypt_and_store(
        &self,
        ctx: &CancelToken,
        id: &str,
        field_name: &str,
        plaintext: &str,
        key_id: &str,
    ) -> Result<(), EncryptionError> {
        let start = Instant::now();
        ctx.check("encrypt_and_store")?;
        validate_field_input(id, field_name)?;

        if plaintext.len() > self.encryption.max_data_size() {
            return Err(
                EncryptionError::new(ErrorKind::DataTooLarge, "plaintext too large")
                    .with_context("size", plaintext.len())
                    .with_context("max_size", self.encryption.max_data_size()),
            );
        }

        let payload = self.encryption.encrypt(ctx, plaintext, key_id).map_err(|err| {
            tracing::warn!(field_id = %id, field_name = %field_name, error = %err, "field encryption failed");
            err
        })?;

        let field = Arc::new(FieldEncryption::new(id, field_name, payload)?);
        self.fields.save(ctx, field).map_err(|err| {
            EncryptionError::new(
                ErrorKind::ServiceUnavailable,
                "failed to save encrypted field",
            )
            .with_context("field_id", id)
            .with_source(err)
        })?;

        tracing::info!(
            field_id = %id,
            field_name = %field_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "field encrypted and stored"
        );
        Ok(())
    }

    /// Load the aggregate for `id` and return its decrypted value.
    pub fn decrypt_field(&self, ctx: &CancelToken, id: &str) -> Result<String, EncryptionError> {
        ctx.check("decrypt_field")?;
        let field = self.fields.find_by_id(ctx, id)?;
        let plaintext = self.encryption.decrypt(ctx, &field.payload()).map_err(|err| {
            tracing::warn!(field_id = %id, error = %err, "field decryption failed");
            err
        })?;
        tracing::debug!(field_id = %id, "field decrypted");
        Ok(plaintext)
    }

    /// Re-encrypt the field's payload under `new_key_id`'s latest key and
    /// persist the replacement.
    pub fn rotate_field_key(
        &self,
        ctx: &CancelToken,
        id: &str,
        new_key_id: &str,
    ) -> Result<(), EncryptionError> {
        let start = Instant::now();
        ctx.check("rotate_field_key")?;

        let field = self.fields.find_by_id(ctx, id)?;
        let old_payload = field.payload();
        let new_payload = self
            .encryption
            .rotate_key(ctx, &old_payload, new_key_id)
            .map_err(|err| {
                tracing::warn!(
                    field_id = %id,
                    old_key_id = %old_payload.key_id(),
                    new_key_id = %new_key_id,
                    error = %err,
                    "field key rotation failed"
                );
                err
            })?;

        field.update_payload(new_payload);
        self.fields.save(ctx, Arc::clone(&field)).map_err(|err| {
            EncryptionError::new(ErrorKind::ServiceUnavailable, "failed to save rotated field")
                .with_context("field_id", id)
                .with_source(err)
        })?;

        tracing::info!(
            field_id = %id,
            old_key_id = %old_payload.key_id(),
            old_version = old_payload.key_version(),
            new_key_id = %new_key_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "field key rotated"
        );
        Ok(())
    }

    /// Encrypt and persist a batch of fields under one key ID.
    ///
    /// All inputs are validated before any work starts. Successfully
    /// encrypted fields are persisted even when siblings fail; the
    /// returned error then names the failed IDs.
    pub fn bulk_encrypt_and_store(
        &self,
        ctx: &CancelToken,
        specs: Vec<FieldSpec>,
        key_id: &str,
    ) -> Result<(), EncryptionError> {
        ctx.check("bulk_encrypt_and_store")?;
        if specs.is_empty() {
            return Ok(());
        }

        for spec in &specs {
            validate_field_input(&spec.id, &spec.name)?;
            if spec.plaintext.len() > self.encryption.max_data_size() {
                return Err(
                    EncryptionError::new(ErrorKind::DataTooLarge, "plaintext too large")
                        .with_context("field_id", &spec.id)
                        .with_context("size", spec.plaintext.len())
                        .with_context("max_size", self.encryption.max_data_size()),
                );
            }
        }

        let total = specs.len();
        let mut names: HashMap<String, String> = HashMap::with_capacity(total);
        let mut items: Vec<(String, String)> = Vec::with_capacity(total);
        for spec in specs {
            names.insert(spec.id.clone(), spec.name);
            items.push((spec.id, spec.plaintext));
        }

        let result = self.encryption.bulk_encrypt(ctx, items, key_id)?;
        let failures = result.failures;
        for (id, payload) in result.successes {
            let name = names.get(&id).map(String::as_str).unwrap_or_default();
            let field = Arc::new(FieldEncryption::new(&id, name, payload)?);
            self.fields.save(ctx, field).map_err(|err| {
                EncryptionError::new(
                    ErrorKind::ServiceUnavailable,
                    "failed to save bulk encrypted field",
                )
                .with_context("field_id", &id)
                .with_source(err)
            })?;
        }

        if !failures.is_empty() {
            let mut failed: Vec<&str> = failures.keys().map(String::as_str).collect();
            failed.sort_unstable();
            return Err(EncryptionError::new(
                ErrorKind::EncryptionFailed,
                "bulk encryption partially failed",
            )
            .with_context("failed_ids", failed.join(","))
            .with_context("failed_count", failures.len()));
        }

        tracing::info!(count = total, "bulk fields encrypted and stored");
        Ok(())
    }

    pub fn delete_field(&self, ctx: &CancelToken, id: &str) -> Result<(), EncryptionError> {
        self.fields.delete(ctx, id)
    }

    /// Healthy only when both the key store and the field store are.
    pub fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError> {
        self.encryption.health_check(ctx)?;
        self.fields.health_check(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_store::InMemoryFieldRepository;
    use crate::metrics::NoopMetrics;
    use crate::repository::{InMemoryKeyRepository, KeyRepository, DEFAULT_KEY_ID};
    use fieldseal_crypto::{Algorithm, KeyId, KeyMaterial};

    struct Stack {
        service: FieldEncryptionService,
        key_repo: Arc<InMemoryKeyRepository>,
        field_repo: Arc<InMemoryFieldRepository>,
    }

    fn stack_with_limit(max_data_size: usize) -> Stack {
        let master = KeyMaterial::generate(32).unwrap().to_vec();
        let key_repo = Arc::new(
            InMemoryKeyRepository::new(
                &master,
                Algorithm::Aes256Gcm,
                chrono::Duration::hours(24),
                Arc::new(NoopMetrics),
            )
            .unwrap(),
        );
        let encryption = Arc::new(EncryptionService::new(
            key_repo.clone(),
            Arc::new(NoopMetrics),
            max_data_size,
        ));
        let field_repo = Arc::new(InMemoryFieldRepository::new());
        Stack {
            service: FieldEncryptionService::new(encryption, field_repo.clone()),
            key_repo,
            field_repo,
        }
    }

    fn stack() -> Stack {
        stack_with_limit(1024 * 1024)
    }

    #[test]
    fn encrypt_store_then_decrypt_round_trips() {
        let stack = stack();
        let ctx = CancelToken::new();

        stack
            .service
            .encrypt_and_store(&ctx, "user-123", "email", "user@example.com", "")
            .unwrap();
        let plaintext = stack.service.decrypt_field(&ctx, "user-123").unwrap();
        assert_eq!(plaintext, "user@example.com");
    }

    #[test]
    fn decrypting_an_unknown_field_fails() {
        let stack = stack();
        let err = stack
            .service
            .decrypt_field(&CancelToken::new(), "ghost")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(err.to_string().contains("field not found"));
    }

    #[test]
    fn invalid_inputs_are_rejected_before_any_crypto() {
        let stack = stack_with_limit(8);
        let ctx = CancelToken::new();

        let err = stack
            .service
            .encrypt_and_store(&ctx, "", "email", "x", "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = stack
            .service
            .encrypt_and_store(&ctx, "user-123", "email", "way past the cap", "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataTooLarge);
    }

    #[test]
    fn rotate_field_key_keeps_the_value_and_bumps_the_aggregate() {
        let stack = stack();
        let ctx = CancelToken::new();
        stack
            .service
            .encrypt_and_store(&ctx, "user-123", "email", "pinned value", "")
            .unwrap();

        stack
            .key_repo
            .rotate_key(&ctx, &KeyId::from(DEFAULT_KEY_ID))
            .unwrap();
        stack
            .service
            .rotate_field_key(&ctx, "user-123", "")
            .unwrap();

        let field = stack.field_repo.find_by_id(&ctx, "user-123").unwrap();
        assert_eq!(field.version(), 2);
        assert_eq!(field.payload().key_version(), 2);
        assert_eq!(
            stack.service.decrypt_field(&ctx, "user-123").unwrap(),
            "pinned value"
        );
    }

    #[test]
    fn rotating_a_missing_field_fails_before_touching_keys() {
        let stack = stack();
        let err = stack
            .service
            .rotate_field_key(&CancelToken::new(), "ghost", "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn bulk_encrypt_and_store_persists_every_field() {
        let stack = stack();
        let ctx = CancelToken::new();
        let specs: Vec<FieldSpec> = (0..5)
            .map(|i| FieldSpec {
                id: format!("user-{i}"),
                name: "email".into(),
                plaintext: format!("user{i}@example.com"),
            })
            .collect();

        stack.service.bulk_encrypt_and_store(&ctx, specs, "").unwrap();
        for i in 0..5 {
            assert_eq!(
                stack
                    .service
                    .decrypt_field(&ctx, &format!("user-{i}"))
                    .unwrap(),
                format!("user{i}@example.com")
            );
        }
    }

    #[test]
    fn bulk_validation_failure_rejects_the_whole_batch_upfront() {
        let stack = stack();
        let ctx = CancelToken::new();
        let specs = vec![
            FieldSpec {
                id: "user-1".into(),
                name: "email".into(),
                plaintext: "a@example.com".into(),
            },
            FieldSpec {
                id: "".into(),
                name: "email".into(),
                plaintext: "b@example.com".into(),
            },
        ];

        let err = stack
            .service
            .bulk_encrypt_and_store(&ctx, specs, "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        // Nothing was persisted.
        assert!(stack
            .field_repo
            .find_by_id(&ctx, "user-1")
            .is_err());
    }

    #[test]
    fn bulk_under_an_unknown_key_reports_every_failed_id() {
        let stack = stack();
        let ctx = CancelToken::new();
        let specs: Vec<FieldSpec> = (0..3)
            .map(|i| FieldSpec {
                id: format!("user-{i}"),
                name: "email".into(),
                plaintext: "value".into(),
            })
            .collect();

        let err = stack
            .service
            .bulk_encrypt_and_store(&ctx, specs, "ghost")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncryptionFailed);
        assert!(err.to_string().contains("partially failed"));
        assert_eq!(
            err.context().get("failed_ids").map(String::as_str),
            Some("user-0,user-1,user-2")
        );
        assert!(stack.field_repo.find_by_id(&ctx, "user-0").is_err());
    }

    #[test]
    fn empty_bulk_batch_is_a_no_op() {
        let stack = stack();
        assert!(stack
            .service
            .bulk_encrypt_and_store(&CancelToken::new(), Vec::new(), "")
            .is_ok());
    }

    #[test]
    fn delete_field_removes_the_aggregate() {
        let stack = stack();
        let ctx = CancelToken::new();
        stack
            .service
            .encrypt_and_store(&ctx, "user-123", "email", "bye", "")
            .unwrap();

        stack.service.delete_field(&ctx, "user-123").unwrap();
        assert!(stack.service.decrypt_field(&ctx, "user-123").is_err());
    }

    #[test]
    fn health_check_covers_both_stores() {
        let stack = stack();
        assert!(stack.service.health_check(&CancelToken::new()).is_ok());
    }

    #[test]
    fn cancelled_token_blocks_the_orchestration_layer() {
        let stack = stack();
        let ctx = CancelToken::new();
        ctx.cancel();

        let err = stack
            .service
            .encrypt_and_store(&ctx, "user-123", "email", "x", "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(stack.service.decrypt_field(&ctx, "user-123").is_err());
        assert!(stack.service.rotate_field_key(&ctx, "user-123", "").is_err());
        assert!(stack.service.health_check(&ctx).is_err());
    }
}
