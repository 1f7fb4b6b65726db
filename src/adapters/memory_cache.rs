//! In-memory TTL cache.

use crate::ports::cache_port::CachePort;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Entries older than `ttl` read as absent and are evicted on the next write.
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<(String, String), CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> CachePort<V> for MemoryCache<V> {
    fn get(&self, category: &str, key: &str) -> Option<(V, Duration)> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(&(category.to_string(), key.to_string()))?;
        let age = entry.stored_at.elapsed();
        (age <= self.ttl).then(|| (entry.value.clone(), age))
    }

    fn put(&self, category: &str, key: &str, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            let ttl = self.ttl;
            entries.retain(|_, e| e.stored_at.elapsed() <= ttl);
            entries.insert(
                (category.to_string(), key.to_string()),
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    fn invalidate(&self, category: &str, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(category.to_string(), key.to_string()));
        }
    }

    fn invalidate_category(&self, category: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|(c, _), _| c != category);
        }
    }
}
