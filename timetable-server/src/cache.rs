//! Time-boxed caching of async producers.
//!
//! Each key holds the last successfully fetched value and the instant it was
//! stored. Once an entry is older than the validity window the next `get`
//! refetches it; if that refetch fails, the expired value is served instead
//! of the error.
//!
//! Misses are serialized per key, so callers that find the same key expired
//! at the same time share a single fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a stored value is served without refetching.
    pub validity: Duration,

    /// Maximum number of cached keys.
    pub max_capacity: u64,
}

impl CacheConfig {
    /// Create a config with the given validity window.
    pub fn new(validity: Duration) -> Self {
        Self {
            validity,
            ..Self::default()
        }
    }

    /// Set the maximum number of cached keys.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(60 * 60),
            max_capacity: 64,
        }
    }
}

/// Marks which clears an entry has survived.
///
/// `epoch` moves on `clear_all`, `key` on `clear` of that key. An entry
/// stored under an older generation is treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    epoch: u64,
    key: u64,
}

/// A stored value, when it was fetched, and the generation it belongs to.
struct CacheEntry<V> {
    timestamp: Instant,
    generation: Generation,
    data: Arc<V>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, validity: Duration) -> bool {
        self.timestamp.elapsed() < validity
    }
}

// Manual impl: `V` itself need not be `Clone`.
impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            generation: self.generation,
            data: Arc::clone(&self.data),
        }
    }
}

/// Refresh lock and clear counter of one key.
#[derive(Default)]
struct KeyState {
    refresh: Arc<AsyncMutex<()>>,
    generation: u64,
}

/// Per-key TTL cache with stale-on-error fallback.
pub struct TtlCache<V> {
    /// Entries are never evicted by age; expired ones back the stale fallback.
    entries: MokaCache<String, CacheEntry<V>>,

    /// Held while a key is being refetched; counts clears of that key.
    keys: Mutex<HashMap<String, KeyState>>,

    /// Bumped by `clear_all`.
    epoch: AtomicU64,

    validity: Duration,
}

impl<V> TtlCache<V>
where
    V: Send + Sync + 'static,
{
    /// Create a new cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .build();

        Self {
            entries,
            keys: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            validity: config.validity,
        }
    }

    /// Return the cached value for `key`, calling `fetcher` if it is missing
    /// or expired.
    ///
    /// If `fetcher` fails and an earlier value exists (expired or not), that
    /// value is returned and the error is only logged. Without an earlier
    /// value the error is returned.
    ///
    /// A value fetched while `key` is cleared is returned to this caller but
    /// not stored.
    pub async fn get<F, Fut, E>(&self, key: &str, fetcher: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::fmt::Display,
    {
        if let Some(entry) = self.current_entry(key).await
            && entry.is_fresh(self.validity)
        {
            debug!(key, "cache hit");
            return Ok(entry.data);
        }

        let lock = self.refresh_lock(key);
        let _guard = lock.lock().await;

        // Another caller may have refreshed the key while we waited.
        let generation = self.generation(key);
        let previous = self.current_entry(key).await;
        if let Some(entry) = &previous
            && entry.is_fresh(self.validity)
        {
            debug!(key, "cache hit after waiting for refresh");
            return Ok(Arc::clone(&entry.data));
        }

        info!(key, stale = previous.is_some(), "cache miss, fetching");
        match fetcher().await {
            Ok(data) => {
                let data = Arc::new(data);
                if self.generation(key) == generation {
                    let entry = CacheEntry {
                        timestamp: Instant::now(),
                        generation,
                        data: Arc::clone(&data),
                    };
                    self.entries.insert(key.to_string(), entry).await;
                } else {
                    debug!(key, "key cleared during fetch, result not stored");
                }
                Ok(data)
            }
            Err(e) => match previous {
                Some(entry) => {
                    warn!(key, error = %e, "fetch failed, serving stale entry");
                    Ok(entry.data)
                }
                None => Err(e),
            },
        }
    }

    /// Remove the entry for `key`, including one a refresh in flight would store.
    pub async fn clear(&self, key: &str) {
        {
            let mut keys = self.lock_keys();
            keys.entry(key.to_string()).or_default().generation += 1;
        }
        self.entries.invalidate(key).await;
    }

    /// Remove every entry.
    pub fn clear_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate_all();
    }

    /// Approximate number of cached entries (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// The configured validity window.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// The stored entry for `key`, unless a clear has superseded it.
    async fn current_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.get(key).await?;
        (entry.generation == self.generation(key)).then_some(entry)
    }

    fn generation(&self, key: &str) -> Generation {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let key = self
            .lock_keys()
            .get(key)
            .map_or(0, |state| state.generation);
        Generation { epoch, key }
    }

    fn refresh_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut keys = self.lock_keys();
        Arc::clone(&keys.entry(key.to_string()).or_default().refresh)
    }

    fn lock_keys(&self) -> MutexGuard<'_, HashMap<String, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
