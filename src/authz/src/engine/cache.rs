//! LRU cache for set expansions

use blake3::Hasher;
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::scope::ScopeSet;

/// Scopes that can reach roles: `assume:` scopes and wildcards covering
/// `assume:` itself
static ASSUME_RELEVANT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:assume:|(?:a|as|ass|assu|assum|assume)?\*$)")
        .unwrap_or_else(|e| panic!("invalid assume pattern: {e}"))
});

/// Whether `scope` can grant any role
pub fn is_assume_relevant(scope: &str) -> bool {
    ASSUME_RELEVANT.is_match(scope)
}

/// Cache key type (BLAKE3 hash)
pub type CacheKey = [u8; 32];

/// Expansion cache
///
/// Maps the assume-relevant part of a normalized scope set to the scopes
/// it grants. The cache belongs to one resolver snapshot; a rebuild starts
/// with an empty cache.
#[derive(Debug)]
pub struct ExpansionCache {
    entries: Mutex<LruCache<CacheKey, ScopeSet>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExpansionCache {
    /// Create a new cache with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compute cache key for a sorted list of scopes
    pub fn compute_key<S: AsRef<str>>(scopes: &[S]) -> CacheKey {
        let mut hasher = Hasher::new();
        for scope in scopes {
            hasher.update(scope.as_ref().as_bytes());
            hasher.update(b"\n");
        }
        *hasher.finalize().as_bytes()
    }

    /// Get a cached expansion
    pub fn get(&self, key: &CacheKey) -> Option<ScopeSet> {
        let cached = self.entries.lock().get(key).cloned();
        let counter = if cached.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        cached
    }

    /// Store an expansion
    pub fn put(&self, key: CacheKey, scopes: ScopeSet) {
        self.entries.lock().put(key, scopes);
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
            capacity: self.capacity,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_relevant_scopes() {
        for scope in [
            "assume:a", "assume:", "assume:*", "*", "a*", "as*", "ass*", "assu*", "assum*",
            "assume*",
        ] {
            assert!(is_assume_relevant(scope), "{scope}");
        }
        for scope in ["assume", "assumex*", "b*", "queue:*", "", "a", "xassume:a", "*a"] {
            assert!(!is_assume_relevant(scope), "{scope}");
        }
    }

    #[test]
    fn test_cache_operations() {
        let cache = ExpansionCache::new(10);
        let key = ExpansionCache::compute_key(&["assume:a"]);

        // Initially empty
        assert!(cache.get(&key).is_none());

        cache.put(key, vec!["x".to_string()]);
        assert_eq!(cache.get(&key), Some(vec!["x".to_string()]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = ExpansionCache::new(2);
        let a = ExpansionCache::compute_key(&["assume:a"]);
        let b = ExpansionCache::compute_key(&["assume:b"]);
        let c = ExpansionCache::compute_key(&["assume:c"]);

        cache.put(a, vec![]);
        cache.put(b, vec![]);
        assert!(cache.get(&a).is_some());
        cache.put(c, vec![]);

        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_cache_key_consistency() {
        let key1 = ExpansionCache::compute_key(&["assume:a", "assume:b"]);
        let key2 = ExpansionCache::compute_key(&["assume:a".to_string(), "assume:b".to_string()]);
        assert_eq!(key1, key2, "Same scopes should produce same cache key");

        // Separators keep concatenations apart
        let key3 = ExpansionCache::compute_key(&["assume:ab"]);
        let key4 = ExpansionCache::compute_key(&["assume:a", "b"]);
        assert_ne!(key3, key4);
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache = ExpansionCache::new(0);
        assert_eq!(cache.stats().capacity, 1);
    }
}
