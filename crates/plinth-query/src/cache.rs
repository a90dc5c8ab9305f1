//! Bounded, TTL-aware, LRU-evicted result cache keyed by query signature.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use plinth_types::query::ResultSet;

const DEFAULT_CAPACITY: usize = 64;
/// Filtered/text queries stay coherent longer between UI interactions.
const DEFAULT_FILTERED_TTL: Duration = Duration::from_secs(300);
/// Unfiltered browse pages re-render constantly; keep them briefly.
const DEFAULT_BROWSE_TTL: Duration = Duration::from_secs(60);

/// Capacity and TTL tuning for the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub filtered_ttl: Duration,
    pub browse_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            filtered_ttl: DEFAULT_FILTERED_TTL,
            browse_ttl: DEFAULT_BROWSE_TTL,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: ResultSet,
    inserted_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl CacheEntry {
    fn expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// LRU cache in front of the query executor.
///
/// Hits refresh recency; expired entries count as misses and are evicted
/// lazily on access. Entries are replaced whole, never mutated in place.
#[derive(Debug)]
pub struct ResultCache {
    entries: LruCache<String, CacheEntry>,
    config: CacheConfig,
}

impl ResultCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            config,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<ResultSet> {
        self.get_at(key, Instant::now())
    }

    /// Drop every entry, keeping capacity and TTL configuration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Access count recorded for `key`, without touching recency.
    #[must_use]
    pub fn hits(&self, key: &str) -> Option<u64> {
        self.entries.peek(key).map(|e| e.hits)
    }

    /// Store a result computed just now under `key`.
    pub fn put(&mut self, key: String, value: ResultSet, filtered: bool) {
        self.put_at(key, value, filtered, Instant::now());
    }

    /// Store a result computed at `computed_at` under `key`.
    ///
    /// A value computed earlier than an existing entry's insertion never
    /// replaces it, so a slow in-flight computation cannot clobber a
    /// fresher concurrent store.
    pub fn put_at(
        &mut self,
        key: String,
        value: ResultSet,
        filtered: bool,
        computed_at: Instant,
    ) {
        if let Some(existing) = self.entries.peek(&key) {
            if existing.inserted_at > computed_at && !existing.expired_at(computed_at) {
                return;
            }
        }
        let ttl = if filtered {
            self.config.filtered_ttl
        } else {
            self.config.browse_ttl
        };
        self.entries.put(
            key,
            CacheEntry {
                value,
                inserted_at: computed_at,
                ttl,
                hits: 0,
            },
        );
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<ResultSet> {
        if self.entries.peek(key).is_some_and(|e| e.expired_at(now)) {
            self.entries.pop(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        Some(entry.value.clone())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_types::query::SiteRecord;

    fn result(total: u64) -> ResultSet {
        ResultSet {
            rows: vec![SiteRecord {
                id: 1,
                title: "Villa Savoye".into(),
                category: Some("Residence".into()),
                region: Some("Île-de-France".into()),
                year: Some(1931),
                architect: Some("Le Corbusier".into()),
                latitude: Some(48.924),
                longitude: Some(2.028),
            }],
            total_count: total,
            page: 0,
            page_size: 20,
        }
    }

    fn small_cache(capacity: usize) -> ResultCache {
        ResultCache::new(CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn put_then_get_within_ttl_hits() {
        let mut cache = small_cache(4);
        cache.put("k1".into(), result(10), true);
        let hit = cache.get("k1").unwrap();
        assert_eq!(hit.total_count, 10);
    }

    #[test]
    fn miss_on_unknown_key() {
        let mut cache = small_cache(4);
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn expired_entry_is_a_miss_and_evicted() {
        let mut cache = small_cache(4);
        let start = Instant::now();
        cache.put_at("k1".into(), result(1), false, start);
        assert_eq!(cache.len(), 1);

        let later = start + CacheConfig::default().browse_ttl + Duration::from_secs(1);
        assert!(cache.get_at("k1", later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn filtered_ttl_outlives_browse_ttl() {
        let mut cache = small_cache(4);
        let start = Instant::now();
        cache.put_at("browse".into(), result(1), false, start);
        cache.put_at("filtered".into(), result(2), true, start);

        let after_browse = start + Duration::from_secs(90);
        assert!(cache.get_at("browse", after_browse).is_none());
        assert!(cache.get_at("filtered", after_browse).is_some());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache = small_cache(3);
        for i in 0..10 {
            cache.put(format!("k{i}"), result(i), true);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.capacity(), 3);
    }

    #[test]
    fn overflow_evicts_exactly_the_lru_entry() {
        let mut cache = small_cache(2);
        cache.put("a".into(), result(1), true);
        cache.put("b".into(), result(2), true);
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), result(3), true);

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn stale_put_never_replaces_fresher_entry() {
        let mut cache = small_cache(2);
        let now = Instant::now();
        cache.put_at("k".into(), result(2), true, now + Duration::from_secs(5));
        // A result computed before the cached one must not clobber it.
        cache.put_at("k".into(), result(1), true, now);
        assert_eq!(cache.get_at("k", now).unwrap().total_count, 2);
    }

    #[test]
    fn replacement_swaps_the_whole_entry() {
        let mut cache = small_cache(2);
        let now = Instant::now();
        cache.put_at("k".into(), result(1), true, now);
        cache.put_at("k".into(), result(9), true, now + Duration::from_secs(1));
        assert_eq!(
            cache.get_at("k", now + Duration::from_secs(2)).unwrap().total_count,
            9
        );
        assert_eq!(cache.len(), 1);
    }
}
