//! Read-through cache over any key repository.
//!
//! Entries are keyed `"<keyID>:<version>"`. A hit must pass two
//! independent clocks: the cache entry's own TTL and the key's
//! cryptographic expiry. Latest-key lookups always bypass the cache, so
//! a rotation is observed immediately. One background thread sweeps
//! stale entries; nothing else mutates the map from outside this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::RwLock;

use fieldseal_crypto::{EncryptionKey, KeyId};

use crate::cancel::CancelToken;
use crate::error::{EncryptionError, ErrorKind};
use crate::repository::KeyRepository;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    key: EncryptionKey,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_stale(&self, now: Instant) -> bool {
        now >= self.expires_at || self.key.is_expired()
    }
}

/// Caching wrapper around a [`KeyRepository`].
///
/// Exact-version lookups are cached; writes and rotations invalidate
/// before delegating. Dropping the wrapper stops and joins the sweeper.
pub struct CachedKeyRepository {
    inner: Arc<dyn KeyRepository>,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    max_size: usize,
    stop_tx: Option<Sender<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl CachedKeyRepository {
    /// Wrap `inner` with a cache holding entries for `ttl`, at most
    /// `max_size` of them.
    pub fn new(
        inner: Arc<dyn KeyRepository>,
        ttl: Duration,
        max_size: usize,
    ) -> Result<Self, EncryptionError> {
        Self::with_sweep_interval(inner, ttl, max_size, SWEEP_INTERVAL)
    }

    fn with_sweep_interval(
        inner: Arc<dyn KeyRepository>,
        ttl: Duration,
        max_size: usize,
        sweep_interval: Duration,
    ) -> Result<Self, EncryptionError> {
        let entries: Arc<RwLock<HashMap<String, CacheEntry>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let sweep_entries = Arc::clone(&entries);
        let sweeper = std::thread::Builder::new()
            .name("key-cache-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(sweep_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => sweep(&sweep_entries),
                }
            })
            .map_err(|e| {
                EncryptionError::new(
                    ErrorKind::ServiceUnavailable,
                    "failed to start cache sweeper thread",
                )
                .with_source(e)
            })?;

        Ok(CachedKeyRepository {
            inner,
            entries,
            ttl,
            max_size,
            stop_tx: Some(stop_tx),
            sweeper: Some(sweeper),
        })
    }

    fn cache_key(key_id: &KeyId, version: u32) -> String {
        format!("{key_id}:{version}")
    }

    fn insert(&self, cache_key: String, key: EncryptionKey) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_size && !entries.contains_key(&cache_key) {
            let now = Instant::now();
            entries.retain(|_, entry| !entry.is_stale(now));
            if entries.len() >= self.max_size {
                tracing::debug!(size = entries.len(), "key cache full, skipping insert");
                return;
            }
        }
        entries.insert(
            cache_key,
            CacheEntry {
                key,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of live cache entries. For inspection and tests.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn sweep(entries: &RwLock<HashMap<String, CacheEntry>>) {
    let now = Instant::now();
    let mut entries = entries.write();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_stale(now));
    let evicted = before - entries.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = entries.len(), "key cache swept");
    }
}

impl KeyRepository for CachedKeyRepository {
    fn get_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
        version: u32,
    ) -> Result<EncryptionKey, EncryptionError> {
        ctx.check("get_key")?;
        let cache_key = Self::cache_key(key_id, version);

        let mut stale = false;
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&cache_key) {
                if !entry.is_stale(Instant::now()) {
                    tracing::debug!(key_id = %key_id, version, "key cache hit");
                    return Ok(entry.key.clone());
                }
                stale = true;
            }
        }
        if stale {
            self.entries.write().remove(&cache_key);
        }

        let key = self.inner.get_key(ctx, key_id, version)?;
        self.insert(cache_key, key.clone());
        tracing::debug!(key_id = %key_id, version, "key cache miss");
        Ok(key)
    }

    /// Always asks the underlying repository: "latest" changes on every
    /// rotation and serving a stale answer would encrypt under an old
    /// version.
    fn get_latest_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError> {
        self.inner.get_latest_key(ctx, key_id)
    }

    fn store_key(&self, ctx: &CancelToken, key: EncryptionKey) -> Result<(), EncryptionError> {
        let cache_key = Self::cache_key(key.id(), key.version());
        self.entries.write().remove(&cache_key);
        self.inner.store_key(ctx, key)
    }

    fn rotate_key(
        &self,
        ctx: &CancelToken,
        key_id: &KeyId,
    ) -> Result<EncryptionKey, EncryptionError> {
        // The ":" delimiter keeps "user-1" from evicting "user-10".
        let prefix = format!("{key_id}:");
        self.entries
            .write()
            .retain(|cached, _| !cached.starts_with(&prefix));
        self.inner.rotate_key(ctx, key_id)
    }

    fn list_keys(
        &self,
        ctx: &CancelToken,
    ) -> Result<HashMap<KeyId, Vec<EncryptionKey>>, EncryptionError> {
        self.inner.list_keys(ctx)
    }

    fn health_check(&self, ctx: &CancelToken) -> Result<(), EncryptionError> {
        self.inner.health_check(ctx)
    }
}

impl Drop for CachedKeyRepository {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}
