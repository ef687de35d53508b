//! Metrics port for the encryption services.
//!
//! The services report into a [`MetricsSink`]; what backs it (Prometheus,
//! OTel, a test counter) is the application's business. [`AtomicMetrics`]
//! is the in-process implementation, [`NoopMetrics`] the opt-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use fieldseal_crypto::KeyId;

use crate::error::ErrorKind;

pub trait MetricsSink: Send + Sync {
    fn record_encryption_duration(&self, duration: Duration);
    fn record_decryption_duration(&self, duration: Duration);
    fn increment_success_count(&self, op: &str);
    fn increment_error_count(&self, op: &str, kind: ErrorKind);
    fn record_key_rotation(&self, key_id: &KeyId);
}

/// Discards every measurement.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_encryption_duration(&self, _duration: Duration) {}
    fn record_decryption_duration(&self, _duration: Duration) {}
    fn increment_success_count(&self, _op: &str) {}
    fn increment_error_count(&self, _op: &str, _kind: ErrorKind) {}
    fn record_key_rotation(&self, _key_id: &KeyId) {}
}

/// In-process counters, cheap enough to leave on in production.
///
/// Hot totals are lock-free atomics; the labelled tallies sit behind a
/// mutex since they are touched once per operation, not per byte.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    encrypt_count: AtomicU64,
    encrypt_nanos: AtomicU64,
    decrypt_count: AtomicU64,
    decrypt_nanos: AtomicU64,
    successes: Mutex<HashMap<String, u64>>,
    errors: Mutex<HashMap<(String, ErrorKind), u64>>,
    rotations: Mutex<HashMap<String, u64>>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub encrypt_count: u64,
    pub encrypt_total: Duration,
    pub decrypt_count: u64,
    pub decrypt_total: Duration,
    pub successes: HashMap<String, u64>,
    pub errors: HashMap<(String, ErrorKind), u64>,
    pub rotations: HashMap<String, u64>,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        AtomicMetrics::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            encrypt_count: self.encrypt_count.load(Ordering::Relaxed),
            encrypt_total: Duration::from_nanos(self.encrypt_nanos.load(Ordering::Relaxed)),
            decrypt_count: self.decrypt_count.load(Ordering::Relaxed),
            decrypt_total: Duration::from_nanos(self.decrypt_nanos.load(Ordering::Relaxed)),
            successes: self.successes.lock().clone(),
            errors: self.errors.lock().clone(),
            rotations: self.rotations.lock().clone(),
        }
    }
}

impl MetricsSink for AtomicMetrics {
    fn record_encryption_duration(&self, duration: Duration) {
        self.encrypt_count.fetch_add(1, Ordering::Relaxed);
        self.encrypt_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    fn record_decryption_duration(&self, duration: Duration) {
        self.decrypt_count.fetch_add(1, Ordering::Relaxed);
        self.decrypt_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    fn increment_success_count(&self, op: &str) {
        *self.successes.lock().entry(op.to_string()).or_insert(0) += 1;
    }

    fn increment_error_count(&self, op: &str, kind: ErrorKind) {
        *self
            .errors
            .lock()
            .entry((op.to_string(), kind))
            .or_insert(0) += 1;
    }

    fn record_key_rotation(&self, key_id: &KeyId) {
        *self
            .rotations
            .lock()
            .entry(key_id.as_str().to_string())
            .or_insert(0) += 1;
    }
}
