//! TTL cache shared across requests. Entries past their deadline are treated
//! as absent and evicted on read; staleness within the TTL is accepted.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct TtlCache<K, V> {
    entries: DashMap<K, (Instant, V)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns the cached value if present and not expired. Expired entries
    /// are removed so a later insert starts a fresh TTL window.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (deadline, value) = entry.value();
                if Instant::now() < *deadline {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (Instant::now() + self.ttl, value));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    #[cfg(test)]
    fn insert_with_deadline(&self, key: K, value: V, deadline: Instant) {
        self.entries.insert(key, (deadline, value));
    }
}
