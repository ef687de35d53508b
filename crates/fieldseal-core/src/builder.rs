//! One-stop assembly of the encryption stack from configuration.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::cache::CachedKeyRepository;
use crate::config::EncryptionConfig;
use crate::error::{EncryptionError, ErrorKind};
use crate::field_service::FieldEncryptionService;
use crate::field_store::{FieldEncryptionRepository, InMemoryFieldRepository};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::repository::{InMemoryKeyRepository, KeyRepository};
use crate::service::EncryptionService;

/// Wires the whole stack: master key → seeded key repository → optional
/// cache → encryption service → field repository → field service.
///
/// The master key is zeroized once the builder is consumed or dropped,
/// whichever comes first.
pub struct ServiceBuilder {
    config: EncryptionConfig,
    master_key: Zeroizing<Vec<u8>>,
    key_repo: Option<Arc<dyn KeyRepository>>,
    field_repo: Option<Arc<dyn FieldEncryptionRepository>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ServiceBuilder {
    pub fn new(config: EncryptionConfig, master_key: Vec<u8>) -> Self {
        ServiceBuilder {
            config,
            master_key: Zeroizing::new(master_key),
            key_repo: None,
            field_repo: None,
            metrics: None,
        }
    }

    /// Replace the seeded in-memory key repository. The master key goes
    /// unused (but still zeroized) in that case.
    pub fn with_key_repository(mut self, repo: Arc<dyn KeyRepository>) -> Self {
        self.key_repo = Some(repo);
        self
    }

    pub fn with_field_repository(mut self, repo: Arc<dyn FieldEncryptionRepository>) -> Self {
        self.field_repo = Some(repo);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<FieldEncryptionService, EncryptionError> {
        let ServiceBuilder {
            config,
            master_key,
            key_repo,
            field_repo,
            metrics,
        } = self;

        config.validate()?;
        let metrics = metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let key_ttl = chrono::Duration::from_std(config.key_ttl())
            .map_err(|_| EncryptionError::new(ErrorKind::InvalidInput, "key TTL out of range"))?;

        let base: Arc<dyn KeyRepository> = match key_repo {
            Some(repo) => repo,
            None => Arc::new(InMemoryKeyRepository::new(
                &master_key,
                config.algorithm,
                key_ttl,
                Arc::clone(&metrics),
            )?),
        };
        drop(master_key);

        let key_repo: Arc<dyn KeyRepository> = if config.cache.enabled {
            Arc::new(CachedKeyRepository::new(
                base,
                config.cache.ttl(),
                config.cache.max_size,
            )?)
        } else {
            base
        };

        let encryption = Arc::new(EncryptionService::new(
            key_repo,
            metrics,
            config.max_data_size,
        ));
        let field_repo: Arc<dyn FieldEncryptionRepository> =
            field_repo.unwrap_or_else(|| Arc::new(InMemoryFieldRepository::new()));

        tracing::debug!(
            provider = %config.provider,
            algorithm = %config.algorithm,
            cache_enabled = config.cache.enabled,
            max_data_size = config.max_data_size,
            "encryption stack assembled"
        );
        Ok(FieldEncryptionService::new(encryption, field_repo))
    }
}
