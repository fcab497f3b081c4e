//! Time-boxed resolution cache.
//!
//! Entries carry the instant they were loaded and are valid only while
//! `now - loaded_at < ttl`. Expiry is evaluated lazily on read: an expired
//! entry is dropped and reported as absent, never served as stale.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "vitrine_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vitrine_cache_miss_total";
pub(crate) const METRIC_CACHE_EXPIRED: &str = "vitrine_cache_expired_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "vitrine_cache_evict_total";

/// A cached value and the instant it was loaded.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub loaded_at: OffsetDateTime,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        now - self.loaded_at < ttl
    }
}

/// Per-key TTL cache in front of the remote gateway.
pub struct ResolutionCache<V> {
    name: &'static str,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<LruCache<CacheKey, CacheEntry<V>>>,
}

impl<V: Clone> ResolutionCache<V> {
    /// Create a cache backed by the system clock.
    ///
    /// `name` labels the cache in logs and metrics.
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(name: &'static str, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl: config.ttl,
            clock,
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Return the value for `key` if it was loaded less than one TTL ago.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let fresh = entries.peek(key).map(|entry| entry.is_fresh(now, self.ttl));
        match fresh {
            Some(true) => {
                counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
                debug!(cache = self.name, %key, "Resolution cache hit");
                entries.get(key).map(|entry| entry.value.clone())
            }
            Some(false) => {
                entries.pop(key);
                counter!(METRIC_CACHE_EXPIRED, "cache" => self.name).increment(1);
                counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
                debug!(cache = self.name, %key, "Resolution cache entry expired");
                None
            }
            None => {
                counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
                None
            }
        }
    }

    /// Store `value` under `key`, stamped with the current time.
    pub fn set(&self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            loaded_at: self.clock.now(),
        };
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        if let Some((evicted, _)) = entries.push(key.clone(), entry)
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT, "cache" => self.name).increment(1);
            debug!(cache = self.name, key = %evicted, "Resolution cache evicted entry");
        }
    }

    /// Drop one entry, or every entry when `key` is `None`.
    pub fn invalidate(&self, key: Option<&CacheKey>) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
        match key {
            Some(key) => {
                entries.pop(key);
            }
            None => entries.clear(),
        }
    }

    /// Number of stored entries, including ones that have expired but not yet been read.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
