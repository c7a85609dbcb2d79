//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A stored query result.
#[derive(Debug, Clone)]
pub struct CachedQueryResult {
  /// Serialized result
  pub data: Value,
  /// When the result was stored
  pub cached_at: DateTime<Utc>,
  /// Family of the key it was stored under
  pub family: &'static str,
}

/// Trait for cache storage backends.
///
/// Values are kept as JSON so one backend can hold every resource type.
pub trait CacheStorage: Send + Sync {
  /// Get the stored result for a query hash.
  fn get(&self, key: &str) -> Option<CachedQueryResult>;

  /// Store (or replace) the result for a query hash.
  fn put(&self, key: &str, family: &'static str, data: Value);

  /// Remove one entry. Returns whether it existed.
  fn remove(&self, key: &str) -> bool;

  /// Remove every entry of a family. Returns how many were removed.
  fn remove_family(&self, family: &str) -> usize;

  /// Most recently stored entry of a family.
  fn latest_in_family(&self, family: &str) -> Option<CachedQueryResult>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Option<CachedQueryResult> {
    None // Always miss
  }

  fn put(&self, _key: &str, _family: &'static str, _data: Value) {}

  fn remove(&self, _key: &str) -> bool {
    false
  }

  fn remove_family(&self, _family: &str) -> usize {
    0
  }

  fn latest_in_family(&self, _family: &str) -> Option<CachedQueryResult> {
    None
  }
}

/// Process-local storage backed by a hash map.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CachedQueryResult>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  // Entries are plain data, a panic elsewhere cannot leave them half-written
  fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedQueryResult>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries().len()
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CachedQueryResult> {
    self.entries().get(key).cloned()
  }

  fn put(&self, key: &str, family: &'static str, data: Value) {
    self.entries().insert(
      key.to_string(),
      CachedQueryResult {
        data,
        cached_at: Utc::now(),
        family,
      },
    );
  }

  fn remove(&self, key: &str) -> bool {
    self.entries().remove(key).is_some()
  }

  fn remove_family(&self, family: &str) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| entry.family != family);
    before - entries.len()
  }

  fn latest_in_family(&self, family: &str) -> Option<CachedQueryResult> {
    self
      .entries()
      .values()
      .filter(|entry| entry.family == family)
      .max_by_key(|entry| entry.cached_at)
      .cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_put_get_remove() {
    let storage = MemoryStorage::new();
    storage.put("a", "portfolios", json!([1, 2]));

    let cached = storage.get("a").unwrap();
    assert_eq!(cached.data, json!([1, 2]));
    assert_eq!(cached.family, "portfolios");

    assert!(storage.remove("a"));
    assert!(!storage.remove("a"));
    assert!(storage.get("a").is_none());
  }

  #[test]
  fn test_family_operations() {
    let storage = MemoryStorage::new();
    storage.put("bbox-1", "properties:bbox", json!(1));
    std::thread::sleep(std::time::Duration::from_millis(2));
    storage.put("bbox-2", "properties:bbox", json!(2));
    storage.put("page-1", "properties:list", json!(3));

    assert_eq!(
      storage.latest_in_family("properties:bbox").unwrap().data,
      json!(2)
    );
    assert_eq!(storage.remove_family("properties:bbox"), 2);
    assert_eq!(storage.len(), 1);
    assert!(storage.latest_in_family("properties:bbox").is_none());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.put("a", "portfolios", json!(1));
    assert!(storage.get("a").is_none());
  }
}
