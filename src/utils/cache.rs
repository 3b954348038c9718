//! Bounded TTL cache
//!
//! Analysis, pattern and optimization results are cached behind this
//! explicit abstraction so lifetime and eviction are configuration, not
//! implicit global state. Entries expire after a TTL and the map is capped;
//! when full, expired entries are evicted first, then the oldest entry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// In-process cache with per-cache TTL and capacity.
///
/// Safe for concurrent readers/writers (backed by `DashMap`), but the
/// advisor itself is single-writer per instance; see the concurrency notes
/// in the crate docs.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { entries: DashMap::new(), ttl, capacity }
    }

    /// Get a value, lazily dropping it when expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if Utc::now() - entry.inserted_at < self.ttl {
                    return Some(entry.value.clone());
                }
                true
            },
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_one();
        }
        self.entries
            .insert(key, CacheEntry { value, inserted_at: Utc::now() });
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

    /// Drop expired entries; if none were expired, drop the oldest.
    fn evict_one(&self) {
        let now = Utc::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|e| now - e.value().inserted_at >= self.ttl)
            .map(|e| e.key().clone())
            .collect();

        if !expired.is_empty() {
            for key in expired {
                self.entries.remove(&key);
            }
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
