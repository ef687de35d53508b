//! Core encrypt/decrypt service over the key repository.
//!
//! Encryption always uses the latest key version for the requested key
//! ID; decryption always uses the exact version recorded in the payload.
//! The AAD binds each ciphertext to its `(keyID, keyVersion)` pair, so a
//! payload cannot be replayed under a different key identity.

use std::sync::Arc;
use std::time::Instant;

use fieldseal_crypto::{build_aad, generate_nonce, open, seal, EncryptedPayload, KeyId};

use crate::bulk::{run_parallel, BulkResult};
use crate::cancel::CancelToken;
use crate::error::{EncryptionError, ErrorKind};
use crate::metrics::MetricsSink;
use crate::repository::{KeyRepository, DEFAULT_KEY_ID};

pub struct EncryptionService {
    key_repo: Arc<dyn KeyRepository>,
    metrics: Arc<dyn MetricsSink>,
    max_data_size: usize,
}

impl EncryptionService {
    pub fn new(
        key_repo: Arc<dyn KeyRepository>,
        metrics: Arc<dyn MetricsSink>,
        max_data_size: usize,
    ) -> Self {
        EncryptionService {
            key_repo,
            metrics,
            max_data_size,
        }
    }

    pub fn max_data_size(&self) -> usize {
        self.max_data_size
    }

    /// Encrypt `plaintext` under the latest key for `key_id`.
    ///
    /// An empty `key_id` selects [`DEFAULT_KEY_ID`]. Every call draws a
    /// fresh random nonce; nonce reuse under one key never happens here.
    pub fn encrypt(
        &self,
        ctx: &CancelToken,
        plaintext: &str,
        key_id: &str,
    ) -> Result<EncryptedPayload, EncryptionError> {
        let start = Instant::now();
        let result = self.encrypt_inner(ctx, plaintext, key_id);
        self.metrics.record_encryption_duration(start.elapsed());
        match &result {
            Ok(_) => self.metrics.increment_success_count("encrypt"),
            Err(err) => self.metrics.increment_error_count("encrypt", err.kind()),
        }
        result
    }

    fn encrypt_inner(
        &self,
        ctx: &CancelToken,
        plaintext: &str,
        key_id: &str,
    ) -> Result<EncryptedPayload, EncryptionError> {
        ctx.check("encrypt")?;

        let key_id = if key_id.is_empty() {
            KeyId::from(DEFAULT_KEY_ID)
        } else {
            KeyId::from(key_id)
        };

        if plaintext.len() > self.max_data_size {
            return Err(EncryptionError::new(
                ErrorKind::DataTooLarge,
                format!(
                    "data size {} exceeds maximum {}",
                    plaintext.len(),
                    self.max_data_size
                ),
            )
            .with_context("size", plaintext.len())
            .with_context("max_size", self.max_data_size));
        }

        let key = self.key_repo.get_latest_key(ctx, &key_id)?;
        let nonce = generate_nonce(key.algorithm())?;
        let aad = build_aad(&key_id, key.version());
        let ciphertext = seal(&key, &nonce, plaintext.as_bytes(), &aad)?;

        let ciphertext_size = ciphertext.len();
        let payload =
            EncryptedPayload::new(key_id, key.version(), key.algorithm(), nonce, ciphertext)?;

        tracing::debug!(
            key_id = %payload.key_id(),
            version = payload.key_version(),
            plaintext_size = plaintext.len(),
            ciphertext_size,
            "field encrypted"
        );
        Ok(payload)
    }

    /// Decrypt `payload` with the exact key version it names.
    pub fn decrypt(
        &self,
        ctx: &CancelToken,
        payload: &EncryptedPayload,
    ) -> Result<String, EncryptionError> {
        let start = Instant::now();
        let result = self.decrypt_inner(ctx, payload);
        self.metrics.record_decryption_duration(start.elapsed());
        match &result {
            Ok(_) => self.metrics.increment_success_count("decrypt"),
            Err(err) => self.metrics.increment_error_count("decrypt", err.kind()),
        }
        result
    }

    fn decrypt_inner(
        &self,
        ctx: &CancelToken,
        payload: &EncryptedPayload,
    ) -> Result<String, EncryptionError> {
        ctx.check("decrypt")?;

        let key = self
            .key_repo
            .get_key(ctx, payload.key_id(), payload.key_version())?;

        let aad = build_aad(payload.key_id(), payload.key_version());
        let plaintext = open(&key, payload.nonce(), payload.ciphertext(), &aad).map_err(|err| {
            EncryptionError::from(err)
                .with_context("key_id", payload.key_id())
                .with_context("key_version", payload.key_version())
        })?;

        // FromUtf8Error carries the decrypted bytes, so it is not attached
        // as a source.
        let plaintext = String::from_utf8(plaintext).map_err(|_| {
            EncryptionError::new(
                ErrorKind::DecryptionFailed,
                "decrypted data is not valid UTF-8",
            )
            .with_context("key_id", payload.key_id())
            .with_context("key_version", payload.key_version())
        })?;

        tracing::debug!(
            key_id = %payload.key_id(),
            version = payload.key_version(),
            plaintext_size = plaintext.len(),
            "field decrypted"
        );
        Ok(plaintext)
    }

    /// Re-encrypt `old_payload` under the latest key for `new_key_id`.
    ///
    /// Either half failing reports `KEY_ROTATION_FAILED` wrapping the
    /// cause, and the old payload stays valid as-is.
    pub fn rotate_key(
        &self,
        ctx: &CancelToken,
        old_payload: &EncryptedPayload,
        new_key_id: &str,
    ) -> Result<EncryptedPayload, EncryptionError> {
        ctx.check("rotate_key")?;

        let plaintext = self.decrypt(ctx, old_payload).map_err(|err| {
            EncryptionError::new(
                ErrorKind::KeyRotationFailed,
                "failed to decrypt with old key",
            )
            .with_context("key_id", old_payload.key_id())
            .with_context("key_version", old_payload.key_version())
            .with_source(err)
        })?;

        let new_payload = self.encrypt(ctx, &plaintext, new_key_id).map_err(|err| {
            EncryptionError::new(
                ErrorKind::KeyRotationFailed,
                "failed to encrypt with new key",
            )
            .with_context("new_key_id", new_key_id)
            .with_source(err)
        })?;

        self.metrics.record_key_rotation(new_payload.key_id());
        tracing::info!(
            old_key_id = %old_payload.key_id(),
            old_version = old_payload.key_version(),
            new_key_id = %new_payload.key_id(),
            new_version = new_payload.key_version(),
            "payload re-encrypted under new key"
        );
        Ok(new_payload)
    }

    /// Encrypt a batch of `(item_id, plaintext)` pairs under one key ID.
    ///
    /// Per-item failures land in the returned [`BulkResult`]; the outer
    /// `Result` errs only when the batch could not start at all.
    pub fn bulk_encrypt(
        &self,
        ctx: &CancelToken,
        items: Vec<(String, String)>,
        key_id: &str,
    ) -> Result<BulkResult<EncryptedPayload>, EncryptionError> {
        ctx.check("bulk_encrypt")?;
        Ok(run_parallel(
            ctx,
            "bulk_encrypt",
            items,
            |token, _id, plaintext: String| self.encrypt(token, &plaintext, key_id),
        ))
    }

    /// Decrypt a batch of `(item_id, payload)` pairs.
    pub fn bulk_decrypt(
        &self,
        ctx: &CancelToken,
        items: Vec<(String, EncryptedPayload)>,
    ) -> Result<BulkResult<String>, EncryptionError> {
        ctx.check("bulk_decrypt")?;
        Ok(run_parallel(
            ctx,
            "bulk_decrypt",
            items,
            |token, _id, payload: EncryptedPayload| self.decrypt(token, &payload),
        ))
    }

    pub fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError> {
        self.key_repo.health_check(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AtomicMetrics;
    use crate::repository::InMemoryKeyRepository;
    use fieldseal_crypto::{Algorithm, KeyMaterial};

    fn service_with_limit(max_data_size: usize) -> (EncryptionService, Arc<AtomicMetrics>) {
        let metrics = Arc::new(AtomicMetrics::new());
        let master = KeyMaterial::generate(32).unwrap().to_vec();
        let repo = InMemoryKeyRepository::new(
            &master,
            Algorithm::Aes256Gcm,
            chrono::Duration::hours(24),
            metrics.clone(),
        )
        .unwrap();
        let service = EncryptionService::new(Arc::new(repo), metrics.clone(), max_data_size);
        (service, metrics)
    }

    fn service() -> (EncryptionService, Arc<AtomicMetrics>) {
        service_with_limit(1024 * 1024)
    }

    #[test]
    fn round_trip_preserves_plaintext() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let payload = service.encrypt(&ctx, "user@example.com", "").unwrap();
        assert_eq!(payload.key_id().as_str(), DEFAULT_KEY_ID);
        assert_eq!(payload.key_version(), 1);

        let plaintext = service.decrypt(&ctx, &payload).unwrap();
        assert_eq!(plaintext, "user@example.com");
    }

    #[test]
    fn each_encrypt_draws_a_fresh_nonce() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let a = service.encrypt(&ctx, "same input", "").unwrap();
        let b = service.encrypt(&ctx, "same input", "").unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn oversized_plaintext_is_rejected_with_sizes_in_context() {
        let (service, _) = service_with_limit(16);
        let ctx = CancelToken::new();

        let err = service.encrypt(&ctx, "seventeen bytes!!", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataTooLarge);
        assert_eq!(err.context().get("size").map(String::as_str), Some("17"));
        assert_eq!(err.context().get("max_size").map(String::as_str), Some("16"));
    }

    #[test]
    fn unknown_key_id_fails_not_found() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let err = service.encrypt(&ctx, "data", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let payload = service.encrypt(&ctx, "sensitive", "").unwrap();
        let mut ciphertext = payload.ciphertext().to_vec();
        ciphertext[0] ^= 0x01;
        let tampered = EncryptedPayload::new(
            payload.key_id().clone(),
            payload.key_version(),
            payload.algorithm(),
            payload.nonce().to_vec(),
            ciphertext,
        )
        .unwrap();

        let err = service.decrypt(&ctx, &tampered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn payload_rebound_to_a_different_version_fails() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let payload = service.encrypt(&ctx, "pinned", "").unwrap();
        service
            .key_repo
            .rotate_key(&ctx, &KeyId::from(DEFAULT_KEY_ID))
            .unwrap();

        // Claim the v1 ciphertext came from v2: the AAD no longer matches.
        let rebound = EncryptedPayload::new(
            payload.key_id().clone(),
            2,
            payload.algorithm(),
            payload.nonce().to_vec(),
            payload.ciphertext().to_vec(),
        )
        .unwrap();

        let err = service.decrypt(&ctx, &rebound).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn decrypt_of_non_utf8_plaintext_fails_closed() {
        let (service, _) = service();
        let ctx = CancelToken::new();
        let key = service
            .key_repo
            .get_latest_key(&ctx, &KeyId::from(DEFAULT_KEY_ID))
            .unwrap();

        let nonce = generate_nonce(key.algorithm()).unwrap();
        let aad = build_aad(key.id(), key.version());
        let ciphertext = seal(&key, &nonce, &[0xff, 0xfe, 0x80], &aad).unwrap();
        let payload = EncryptedPayload::new(
            key.id().clone(),
            key.version(),
            key.algorithm(),
            nonce,
            ciphertext,
        )
        .unwrap();

        let err = service.decrypt(&ctx, &payload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn rotation_moves_payload_to_new_key_and_keeps_old_payload_valid() {
        let (service, metrics) = service();
        let ctx = CancelToken::new();

        let old = service.encrypt(&ctx, "rotate me", "").unwrap();
        // Mint a first version under a separate key ID to rotate onto.
        service
            .key_repo
            .rotate_key(&ctx, &KeyId::from("tenant-b"))
            .unwrap();

        let new = service.rotate_key(&ctx, &old, "tenant-b").unwrap();
        assert_eq!(new.key_id().as_str(), "tenant-b");
        assert_eq!(service.decrypt(&ctx, &new).unwrap(), "rotate me");
        assert_eq!(service.decrypt(&ctx, &old).unwrap(), "rotate me");
        // One count for the tenant-b version mint, one for the rewrap.
        assert_eq!(metrics.snapshot().rotations.get("tenant-b"), Some(&2));
    }

    #[test]
    fn rotation_failure_is_reported_as_rotation_failed() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let payload = service.encrypt(&ctx, "value", "").unwrap();
        let mut ciphertext = payload.ciphertext().to_vec();
        ciphertext[3] ^= 0xff;
        let tampered = EncryptedPayload::new(
            payload.key_id().clone(),
            payload.key_version(),
            payload.algorithm(),
            payload.nonce().to_vec(),
            ciphertext,
        )
        .unwrap();

        let err = service.rotate_key(&ctx, &tampered, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyRotationFailed);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn bulk_encrypt_then_bulk_decrypt_round_trips() {
        let (service, _) = service();
        let ctx = CancelToken::new();
        let items: Vec<(String, String)> = (0..12)
            .map(|i| (format!("field-{i}"), format!("value-{i}")))
            .collect();

        let encrypted = service.bulk_encrypt(&ctx, items, "").unwrap();
        assert!(encrypted.is_complete_success());
        assert_eq!(encrypted.successes.len(), 12);

        let decrypted = service
            .bulk_decrypt(&ctx, encrypted.successes.into_iter().collect())
            .unwrap();
        assert_eq!(decrypted.successes.len(), 12);
        assert_eq!(decrypted.successes["field-7"], "value-7");
    }

    #[test]
    fn bulk_decrypt_isolates_bad_key_ids() {
        let (service, _) = service();
        let ctx = CancelToken::new();

        let mut items = Vec::new();
        for i in 0..3 {
            let payload = service.encrypt(&ctx, &format!("good-{i}"), "").unwrap();
            items.push((format!("good-{i}"), payload));
        }
        for i in 0..2 {
            let bogus = EncryptedPayload::new(
                KeyId::from("ghost"),
                1,
                Algorithm::Aes256Gcm,
                vec![0u8; 12],
                vec![0u8; 32],
            )
            .unwrap();
            items.push((format!("bad-{i}"), bogus));
        }

        let result = service.bulk_decrypt(&ctx, items).unwrap();
        assert_eq!(result.successes.len(), 3);
        assert_eq!(result.failures.len(), 2);
        assert!(result.failures.contains_key("bad-0"));
        assert!(result.failures.contains_key("bad-1"));
        assert_eq!(result.failures["bad-0"].kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn bulk_encrypt_collects_per_item_size_failures() {
        let (service, _) = service_with_limit(8);
        let ctx = CancelToken::new();
        let items = vec![
            ("small-1".to_string(), "tiny".to_string()),
            ("big-1".to_string(), "way past the limit".to_string()),
            ("small-2".to_string(), "ok".to_string()),
        ];

        let result = service.bulk_encrypt(&ctx, items, "").unwrap();
        assert_eq!(result.successes.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures["big-1"].kind(), ErrorKind::DataTooLarge);
    }

    #[test]
    fn cancelled_token_fails_bulk_before_it_starts() {
        let (service, _) = service();
        let ctx = CancelToken::new();
        ctx.cancel();

        let err = service
            .bulk_encrypt(&ctx, vec![("a".into(), "b".into())], "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn metrics_track_durations_successes_and_errors() {
        let (service, metrics) = service();
        let ctx = CancelToken::new();

        let payload = service.encrypt(&ctx, "observed", "").unwrap();
        service.decrypt(&ctx, &payload).unwrap();
        service.encrypt(&ctx, "no such key", "ghost").unwrap_err();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.encrypt_count, 2);
        assert_eq!(snapshot.decrypt_count, 1);
        assert_eq!(snapshot.successes.get("encrypt"), Some(&1));
        assert_eq!(snapshot.successes.get("decrypt"), Some(&1));
        assert_eq!(
            snapshot
                .errors
                .get(&("encrypt".to_string(), ErrorKind::KeyNotFound)),
            Some(&1)
        );
    }

    #[test]
    fn health_check_delegates_to_key_repository() {
        let (service, _) = service();
        assert!(service.health_check(&CancelToken::new()).is_ok());
    }
}
