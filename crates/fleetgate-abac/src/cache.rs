//! TTL cache for decisions and access policies.
//!
//! Keys are BLAKE3 digests of a canonical JSON rendering of the inputs
//! (object keys sorted), so two logically identical requests always share an
//! entry. Expired entries are evicted lazily on lookup and by a sweep that
//! runs from the write path at most once per sweep interval.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Digest identifying a cache entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(blake3::Hash);

impl CacheKey {
    /// Hashes the canonical JSON form of `input`.
    ///
    /// `serde_json` maps are ordered by key, so struct field order and map
    /// insertion order do not affect the digest.
    pub fn digest<T: Serialize + ?Sized>(input: &T) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_value(input)?;
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(Self(blake3::hash(&bytes)))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..16])
    }
}

/// Cache timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because they expired.
    pub evictions: u64,
    /// Entries removed because they failed validation.
    pub anomalies: u64,
    pub entries: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    anomalies: AtomicU64,
}

/// Concurrent cache with per-entry expiry.
pub struct TtlCache<V> {
    entries: DashMap<CacheKey, Entry<V>>,
    config: CacheConfig,
    last_sweep: Mutex<Instant>,
    counters: Counters,
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            last_sweep: Mutex::new(Instant::now()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Returns a live entry, evicting it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.get_valid(key, |_| true)
    }

    /// Returns a live entry that passes `is_valid`.
    ///
    /// An entry that fails validation is evicted, counted as an anomaly and
    /// reported as a miss.
    pub fn get_valid(&self, key: &CacheKey, is_valid: impl FnOnce(&V) -> bool) -> Option<V> {
        let now = Instant::now();

        let value = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => entry.value.clone(),
            Some(entry) => {
                drop(entry);
                if self.entries.remove_if(key, |_, e| e.expires_at <= now).is_some() {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Cache miss (expired)");
                return None;
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if !is_valid(&value) {
            self.entries.remove(key);
            self.counters.anomalies.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            warn!(key = ?key, "Evicted cache entry that failed validation");
            return None;
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Inserts with the configured TTL.
    pub fn put(&self, key: CacheKey, value: V) {
        self.put_with_ttl(key, value, self.config.ttl);
    }

    pub fn put_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        self.maybe_sweep();
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            // Unrepresentable expiry: never serve a stale value for this key.
            self.entries.remove(&key);
            warn!(key = ?key, ttl_secs = ttl.as_secs(), "Cache TTL overflows, entry not stored");
            return;
        };
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Removes every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.counters
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    fn maybe_sweep(&self) {
        // Only one writer sweeps; others skip rather than wait.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if last.elapsed() < self.config.sweep_interval {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.sweep();
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            anomalies: self.counters.anomalies.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(n: u32) -> CacheKey {
        CacheKey::digest(&json!({ "n": n })).unwrap()
    }

    fn cache() -> TtlCache<String> {
        TtlCache::new(CacheConfig::default())
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = CacheKey::digest(&json!({ "role": "executive", "action": "view" })).unwrap();
        let b = CacheKey::digest(&json!({ "action": "view", "role": "executive" })).unwrap();
        assert_eq!(a, b);

        let c = CacheKey::digest(&json!({ "action": "view", "role": "support" })).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = cache();
        assert_eq!(cache.get(&key(1)), None);

        cache.put(key(1), "one".to_string());
        assert_eq!(cache.get(&key(1)).as_deref(), Some("one"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_unrepresentable_ttl_not_stored() {
        let cache = cache();
        cache.put(key(1), "old".to_string());
        cache.put_with_ttl(key(1), "forever".to_string(), Duration::MAX);

        assert_eq!(cache.get(&key(1)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_never_served() {
        let cache = cache();
        cache.put_with_ttl(key(1), "stale".to_string(), Duration::ZERO);

        assert_eq!(cache.get(&key(1)), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalid_entry_evicted_as_anomaly() {
        let cache = cache();
        cache.put(key(1), "corrupt".to_string());

        assert_eq!(cache.get_valid(&key(1), |v| v != "corrupt"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.anomalies, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = cache();
        cache.put_with_ttl(key(1), "old".to_string(), Duration::ZERO);
        cache.put(key(2), "fresh".to_string());

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(2)).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_write_path_sweeps_after_interval() {
        let cache: TtlCache<String> = TtlCache::new(CacheConfig {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::ZERO,
        });
        cache.put_with_ttl(key(1), "old".to_string(), Duration::ZERO);
        cache.put(key(2), "fresh".to_string());

        // The second put swept the expired first entry.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        cache.put(key(1), "a".to_string());
        cache.put(key(2), "b".to_string());
        cache.clear();
        assert!(cache.is_empty());
    }
}
