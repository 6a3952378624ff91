//! In-memory TTL cache.
//!
//! Expiry is measured on a monotonic clock (`std::time::Instant`), never
//! wall time, so clock adjustments cannot resurrect or prematurely kill
//! entries. A read that observes an expired entry removes it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Errors from cache construction and insertion.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// TTLs must be strictly positive.
    #[error("ttl must be greater than zero")]
    NonPositiveTtl,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// TTL cache keyed by arbitrary hashable keys.
///
/// All operations are serialized on an internal mutex, so concurrent
/// get/set/invalidate calls never corrupt state. No caller ever observes
/// an entry past its expiry.
pub struct TtlCache<K, V> {
    default_ttl: Duration,
    items: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Result<Self, CacheError> {
        if default_ttl.is_zero() {
            return Err(CacheError::NonPositiveTtl);
        }
        Ok(Self {
            default_ttl,
            items: Mutex::new(HashMap::new()),
        })
    }

    /// Get the value for a key, if present and not expired.
    ///
    /// An expired entry is removed, not merely skipped.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let entry = items.get(key)?;
        if entry.expires_at <= Instant::now() {
            items.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store a value under the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.insert(key, value, self.default_ttl);
    }

    /// Store a value with an explicit TTL, which must be strictly positive.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::NonPositiveTtl);
        }
        self.insert(key, value, ttl);
        Ok(())
    }

    fn insert(&self, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(key, entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &K) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.remove(key);
    }

    /// Remove all entries.
    pub fn invalidate_all(&self) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.clear();
    }

    /// Whether a live entry exists for the key.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_default_ttl_is_rejected() {
        assert!(TtlCache::<String, u32>::new(Duration::ZERO).is_err());
    }

    #[test]
    fn get_and_set_round_trip() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        cache
            .set_with_ttl("a".to_string(), 1, Duration::from_millis(5))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a".to_string()), None);
        // The entry must be gone, not just hidden.
        let items = cache.items.lock().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn zero_ttl_set_fails() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        assert!(
            cache
                .set_with_ttl("a".to_string(), 1, Duration::ZERO)
                .is_err()
        );
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn invalidate_single_and_all() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));

        cache.invalidate_all();
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        cache.set("a".to_string(), 1);
        cache.set("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn contains_respects_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60)).unwrap();
        cache
            .set_with_ttl("a".to_string(), 1, Duration::from_millis(5))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!cache.contains(&"a".to_string()));
    }
}
