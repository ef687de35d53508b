//! Field-level envelope encryption: versioned key repositories, caching, bulk operations, and field-aggregate services.

pub mod builder;
pub mod bulk;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod field;
pub mod field_service;
pub mod field_store;
pub mod metrics;
pub mod repository;
pub mod service;

pub use builder::ServiceBuilder;
pub use bulk::{BulkResult, MAX_BULK_WORKERS};
pub use cache::CachedKeyRepository;
pub use cancel::CancelToken;
pub use config::{CacheConfig, EncryptionConfig};
pub use error::{EncryptionError, ErrorKind};
pub use field::{FieldEncryption, MAX_FIELD_INPUT_LEN};
pub use field_service::{FieldEncryptionService, FieldSpec};
pub use field_store::{FieldEncryptionRepository, InMemoryFieldRepository};
pub use metrics::{AtomicMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use repository::{InMemoryKeyRepository, KeyRepository, DEFAULT_KEY_ID};
pub use service::EncryptionService;
