//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Identifies one cached request.
///
/// Two keys with the same `cache_hash` share an entry and an in-flight fetch;
/// every parameter that changes the response must therefore feed the hash.
pub trait QueryKey {
  /// Stable, fixed-length identifier for storage
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs
  fn description(&self) -> String;

  /// Group of keys whose results can stand in for each other while loading
  /// (e.g. all bounding-box queries), and that are invalidated together.
  fn family(&self) -> &'static str;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn into_data(self) -> T {
    self.data
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, considered stale; a background refresh was started
  CacheStale,
  /// Network refresh failed, serving what was cached
  Offline,
}
