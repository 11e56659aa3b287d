//! Bounded key-value cache with per-entry TTL.
//!
//! Despite the name, eviction is by insertion order, not access order — a
//! deliberate simplification for the steady-state workload (a handful of
//! long-lived hot entries plus short bursts of per-note reads) documented
//! alongside the component it backs, [`crate::resources::handler`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::env_util::{parse_bool_env, parse_env_or};
use crate::error::ConfigError;

/// TTL applied to a resource family, keyed by URI prefix.
#[derive(Debug, Clone)]
pub struct ResourceTtl {
    pub prefix: String,
    pub ttl: Duration,
}

/// Tuning knobs for [`LruCache`] and the handler that wraps it.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl: Duration,
    pub resource_ttls: Vec<ResourceTtl>,
    pub pagination_optimization: bool,
    pub enable_deduplication: bool,
    pub deduplication_ttl: Duration,
}

impl CacheConfig {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        let max_size = parse_env_or("OBSIDIAN_CACHE_MAX_SIZE", 100usize)?;
        let default_ttl_ms = parse_env_or("OBSIDIAN_CACHE_DEFAULT_TTL_MS", 300_000u64)?;
        let dedup_ttl_ms = parse_env_or("OBSIDIAN_CACHE_DEDUP_TTL_MS", 5_000u64)?;
        let pagination_optimization =
            parse_bool_env("OBSIDIAN_CACHE_PAGINATION_OPTIMIZATION", true)?;
        let enable_deduplication = parse_bool_env("OBSIDIAN_CACHE_ENABLE_DEDUPLICATION", true)?;

        Ok(Self {
            max_size,
            default_ttl: Duration::from_millis(default_ttl_ms),
            resource_ttls: Self::default_resource_ttls(),
            pagination_optimization,
            enable_deduplication,
            deduplication_ttl: Duration::from_millis(dedup_ttl_ms),
        })
    }

    fn default_resource_ttls() -> Vec<ResourceTtl> {
        vec![
            ResourceTtl {
                prefix: "vault://recent".to_string(),
                ttl: Duration::from_secs(30),
            },
            ResourceTtl {
                prefix: "vault://tags".to_string(),
                ttl: Duration::from_secs(300),
            },
            ResourceTtl {
                prefix: "vault://stats".to_string(),
                ttl: Duration::from_secs(300),
            },
            ResourceTtl {
                prefix: "vault://structure".to_string(),
                ttl: Duration::from_secs(300),
            },
            ResourceTtl {
                prefix: "vault://note/".to_string(),
                ttl: Duration::from_secs(120),
            },
        ]
    }

    /// Override or add a prefix TTL rule. Intended for tests.
    pub fn with_resource_ttl(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        let prefix = prefix.into();
        if let Some(existing) = self.resource_ttls.iter_mut().find(|r| r.prefix == prefix) {
            existing.ttl = ttl;
        } else {
            self.resource_ttls.push(ResourceTtl { prefix, ttl });
        }
        self
    }

    /// TTL for a URI, by longest matching prefix in `resource_ttls`, falling
    /// back to `default_ttl`.
    pub fn ttl_for(&self, uri: &str) -> Duration {
        self.resource_ttls
            .iter()
            .filter(|r| uri.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len())
            .map(|r| r.ttl)
            .unwrap_or(self.default_ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl: Duration::from_millis(300_000),
            resource_ttls: Self::default_resource_ttls(),
            pagination_optimization: true,
            enable_deduplication: true,
            deduplication_ttl: Duration::from_millis(5_000),
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

/// Point-in-time snapshot of cache effectiveness.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A bounded, FIFO-evicting cache with lazy per-entry TTL expiration.
///
/// Every operation holds `inner` only for the duration of the map/queue
/// mutation — no `.await` happens while the lock is held, so a
/// `std::sync::Mutex` is safe to use from async callers.
pub struct LruCache<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
}

impl<V: Clone> LruCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_size: max_size.max(1),
        }
    }

    /// Returns the cached value for `key`, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.map.remove(key);
                inner.order.retain(|k| k != key);
                inner.misses += 1;
                None
            }
            Some(entry) => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces `key`. `ttl = None` or `Some(Duration::ZERO)` means
    /// no expiration, per spec. `Duration` can't represent negative TTLs;
    /// callers that want the "negative TTL expires immediately" edge case
    /// use [`LruCache::set_expired`].
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let expires_at = match ttl {
            None => None,
            Some(d) if d.is_zero() => None,
            Some(d) => Some(now + d),
        };

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let is_replace = inner.map.contains_key(&key);
        inner.map.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: now,
                expires_at,
            },
        );
        if is_replace {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key);

        while inner.map.len() > self.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
                inner.evictions += 1;
            } else {
                break;
            }
        }
    }

    /// Inserts a value that is already expired — used to exercise the
    /// "negative TTL means immediate expiry" edge case from tests.
    pub fn set_expired(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let is_replace = inner.map.contains_key(&key);
        inner.map.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: now,
                expires_at: Some(now),
            },
        );
        if is_replace {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key);
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let removed = inner.map.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    /// Deletes every key for which `predicate` returns true. Used by
    /// invalidation-event handling, which deletes by prefix rather than by
    /// exact key.
    pub fn delete_matching(&self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = inner
            .map
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in &doomed {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.map.len(),
        }
    }

    /// Insertion timestamp for a live key, exposed for TTL-coherence tests.
    #[cfg(test)]
    fn inserted_at(&self, key: &str) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .get(key)
            .map(|e| e.inserted_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set_returns_value() {
        let cache = LruCache::new(10);
        cache.set("a", 1, Some(Duration::from_secs(60)));
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn ttl_zero_never_expires() {
        let cache = LruCache::new(10);
        cache.set("a", 1, Some(Duration::ZERO));
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.inserted_at("a").is_some());
    }

    #[test]
    fn negative_ttl_edge_case_expires_immediately() {
        let cache: LruCache<i32> = LruCache::new(10);
        cache.set_expired("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let cache = LruCache::new(10);
        cache.set("a", 1, Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn size_bound_is_enforced_by_fifo_eviction() {
        let cache = LruCache::new(3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        cache.set("d", 4, None);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("d"), Some(4));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_an_existing_key_does_not_count_as_eviction() {
        let cache = LruCache::new(3);
        cache.set("a", 1, None);
        cache.set("a", 2, None);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn delete_matching_removes_by_prefix() {
        let cache = LruCache::new(10);
        cache.set("vault://note/a.md", "a", None);
        cache.set("vault://note/b.md", "b", None);
        cache.set("vault://tags", "tags", None);

        let removed = cache.delete_matching(|k| k.starts_with("vault://note/"));
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("vault://tags"), Some("tags"));
    }

    #[test]
    fn hit_and_miss_counters_are_tracked() {
        let cache = LruCache::new(10);
        cache.set("a", 1, None);
        let _ = cache.get("a");
        let _ = cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
