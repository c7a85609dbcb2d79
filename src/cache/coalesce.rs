use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::api::error::ApiResult;

/// One fetch, awaited by every caller that asked for the same key while it ran.
pub type SharedFetch = Shared<BoxFuture<'static, ApiResult<Value>>>;

/// Tracks the fetch in flight for each cache key.
#[derive(Default)]
pub struct Coalescer {
  inflight: Mutex<HashMap<String, SharedFetch>>,
}

impl Coalescer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the fetch running for `key`, or start one with `start`.
  ///
  /// A started fetch is spawned so it completes even if every caller stops
  /// waiting. It must call [`Coalescer::finish`] before resolving.
  pub fn join_or_start<F>(&self, key: &str, start: F) -> (SharedFetch, bool)
  where
    F: FnOnce() -> BoxFuture<'static, ApiResult<Value>>,
  {
    let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(running) = inflight.get(key) {
      return (running.clone(), false);
    }

    let fetch = start().shared();
    inflight.insert(key.to_string(), fetch.clone());
    drop(inflight);

    tokio::spawn(fetch.clone());
    (fetch, true)
  }

  /// Forget the fetch for `key`; later callers start a new one.
  pub fn finish(&self, key: &str) {
    self
      .inflight
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(key);
  }

  #[cfg(test)]
  pub fn tracked(&self) -> usize {
    self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ApiError;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn start(
    coalescer: &Arc<Coalescer>,
    calls: &Arc<AtomicUsize>,
    result: ApiResult<Value>,
  ) -> impl FnOnce() -> BoxFuture<'static, ApiResult<Value>> {
    let coalescer = coalescer.clone();
    let calls = calls.clone();
    move || {
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        coalescer.finish("k");
        result
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_callers_share_one_fetch() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, first) = coalescer.join_or_start("k", start(&coalescer, &calls, Ok(json!(1))));
    let (b, second) = coalescer.join_or_start("k", start(&coalescer, &calls, Ok(json!(2))));
    assert!(first);
    assert!(!second);

    let (a, b) = tokio::join!(a, b);
    assert_eq!(a, Ok(json!(1)));
    assert_eq!(b, Ok(json!(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coalescer.tracked(), 0);
  }

  #[tokio::test]
  async fn test_failure_reaches_every_caller() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let failure = ApiError::Http {
      url: "http://localhost:8000/api/portfolios/".to_string(),
      status: 502,
    };

    let (a, _) = coalescer.join_or_start("k", start(&coalescer, &calls, Err(failure.clone())));
    let (b, _) = coalescer.join_or_start("k", start(&coalescer, &calls, Ok(json!(2))));

    let (a, b) = tokio::join!(a, b);
    assert_eq!(a, Err(failure.clone()));
    assert_eq!(b, Err(failure));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_completes_without_callers() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let (fetch, _) = coalescer.join_or_start("k", start(&coalescer, &calls, Ok(json!(1))));
    drop(fetch);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coalescer.tracked(), 0);
  }

  #[tokio::test]
  async fn test_different_keys_run_separately() {
    let coalescer = Arc::new(Coalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let (_a, first) = coalescer.join_or_start("a", start(&coalescer, &calls, Ok(json!(1))));
    let (_b, second) = coalescer.join_or_start("b", start(&coalescer, &calls, Ok(json!(2))));
    assert!(first);
    assert!(second);
  }
}
