//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::coalesce::{Coalescer, SharedFetch};
use super::storage::{CacheStorage, CachedQueryResult};
use super::traits::{CacheResult, QueryKey};
use crate::api::error::{ApiError, ApiResult};

/// Per-call overrides of the layer defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
  /// Overrides the layer's stale time
  pub stale_time: Option<Duration>,
  /// Serve a stale entry immediately and refresh it in the background
  pub stale_while_revalidate: bool,
}

impl QueryOptions {
  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  pub fn stale_while_revalidate(mut self) -> Self {
    self.stale_while_revalidate = true;
    self
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client. Callers
/// that miss on the same key while a fetch is running await that fetch and
/// all receive its result, success or failure.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  inflight: Arc<Coalescer>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      inflight: Arc::new(Coalescer::new()),
      stale_time: Duration::minutes(1),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  fn is_stale(cached_at: DateTime<Utc>, stale_time: Duration) -> bool {
    Utc::now() - cached_at >= stale_time
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh entry: return it without touching the network
  /// 2. Stale entry with `stale_while_revalidate`: return it, refresh in background
  /// 3. Otherwise join the fetch in flight for the key, or start one
  /// 4. On network failure with a stale entry, return it (offline mode)
  pub async fn fetch<K, T, F, Fut>(
    &self,
    key: &K,
    options: QueryOptions,
    fetcher: F,
  ) -> ApiResult<CacheResult<T>>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let stale_time = options.stale_time.unwrap_or(self.stale_time);

    let previous = self.storage.get(&hash);
    if let Some(cached) = &previous {
      if !Self::is_stale(cached.cached_at, stale_time) {
        debug!(query = %key.description(), "cache hit");
        return Ok(CacheResult::from_cache(decode(cached, &hash)?, cached.cached_at, false));
      }

      if options.stale_while_revalidate {
        debug!(query = %key.description(), "serving stale entry, revalidating");
        let data = decode(cached, &hash)?;
        self.revalidate(key, fetcher);
        return Ok(CacheResult::from_cache(data, cached.cached_at, true));
      }
    }

    match self.shared_fetch(key, fetcher).await {
      Ok(value) => Ok(CacheResult::from_network(decode_value(value, &hash)?)),
      Err(err) => match previous {
        Some(cached) => {
          warn!(query = %key.description(), error = %err, "refresh failed, serving cached data");
          Ok(CacheResult::offline(decode(&cached, &hash)?, cached.cached_at))
        }
        None => Err(err),
      },
    }
  }

  /// Return whatever is cached for `key`, stale or not; fetch only on a miss.
  ///
  /// Used to pre-fetch before a view needs the data. `options` decides how
  /// the returned entry is labelled.
  pub async fn ensure<K, T, F, Fut>(
    &self,
    key: &K,
    options: QueryOptions,
    fetcher: F,
  ) -> ApiResult<CacheResult<T>>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    if let Some(cached) = self.storage.get(&hash) {
      let stale = Self::is_stale(cached.cached_at, options.stale_time.unwrap_or(self.stale_time));
      return Ok(CacheResult::from_cache(decode(&cached, &hash)?, cached.cached_at, stale));
    }
    self.fetch(key, options, fetcher).await
  }

  /// Cached value for `key`, if any, regardless of staleness.
  pub fn get_query_data<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> ApiResult<Option<T>> {
    let hash = key.cache_hash();
    self
      .storage
      .get(&hash)
      .map(|cached| decode(&cached, &hash))
      .transpose()
  }

  /// Seed the entry for `key` with data obtained elsewhere.
  pub fn set_query_data<K: QueryKey, T: Serialize>(&self, key: &K, data: &T) -> ApiResult<()> {
    self.store(&key.cache_hash(), key.family(), data)?;
    Ok(())
  }

  /// Latest result of the same family, to show while `key` loads.
  pub fn placeholder<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> ApiResult<Option<T>> {
    let hash = key.cache_hash();
    let cached = self
      .storage
      .get(&hash)
      .or_else(|| self.storage.latest_in_family(key.family()));
    cached.map(|c| decode(&c, &hash)).transpose()
  }

  pub fn invalidate<K: QueryKey>(&self, key: &K) -> bool {
    let removed = self.storage.remove(&key.cache_hash());
    if removed {
      debug!(query = %key.description(), "invalidated");
    }
    removed
  }

  pub fn invalidate_family(&self, family: &str) -> usize {
    let removed = self.storage.remove_family(family);
    debug!(family, removed, "invalidated family");
    removed
  }

  fn store<T: Serialize>(&self, hash: &str, family: &'static str, data: &T) -> ApiResult<Value> {
    let value = serde_json::to_value(data)
      .map_err(|e| ApiError::Cache(format!("{} could not be serialized: {}", hash, e)))?;
    self.storage.put(hash, family, value.clone());
    Ok(value)
  }

  /// The fetch in flight for `key`, started with `fetcher` if there is none.
  /// A successful result is stored before any caller sees it.
  fn shared_fetch<K, T, F, Fut>(&self, key: &K, fetcher: F) -> SharedFetch
  where
    K: QueryKey,
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let family = key.family();

    let (fetch, started) = self.inflight.join_or_start(&hash, || {
      let layer = self.clone();
      let hash = hash.clone();
      async move {
        let result = match fetcher().await {
          Ok(data) => layer.store(&hash, family, &data),
          Err(err) => Err(err),
        };
        layer.inflight.finish(&hash);
        result
      }
      .boxed()
    });

    if started {
      debug!(query = %key.description(), "cache miss, fetching");
    } else {
      debug!(query = %key.description(), "joining fetch in flight");
    }
    fetch
  }

  fn revalidate<K, T, F, Fut>(&self, key: &K, fetcher: F)
  where
    K: QueryKey,
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let fetch = self.shared_fetch(key, fetcher);
    let description = key.description();
    tokio::spawn(async move {
      if let Err(e) = fetch.await {
        warn!(query = %description, error = %e, "background revalidation failed");
      }
    });
  }
}

fn decode<T: DeserializeOwned>(cached: &CachedQueryResult, hash: &str) -> ApiResult<T> {
  decode_value(cached.data.clone(), hash)
}

fn decode_value<T: DeserializeOwned>(value: Value, hash: &str) -> ApiResult<T> {
  serde_json::from_value(value)
    .map_err(|e| ApiError::Cache(format!("{} could not be decoded: {}", hash, e)))
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      inflight: Arc::clone(&self.inflight),
      stale_time: self.stale_time,
    }
  }
}
