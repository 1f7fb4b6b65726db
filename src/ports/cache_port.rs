//! Key-value cache port for data collaborators.

use std::time::Duration;

/// A cache of opaque values grouped by category.
///
/// Keys are `(category, key)` pairs so a whole category can be dropped at once.
pub trait CachePort<V> {
    /// The value and how long ago it was stored, if present and fresh.
    fn get(&self, category: &str, key: &str) -> Option<(V, Duration)>;

    fn put(&self, category: &str, key: &str, value: V);

    fn invalidate(&self, category: &str, key: &str);

    fn invalidate_category(&self, category: &str);
}
