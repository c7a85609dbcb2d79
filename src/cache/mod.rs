//! Generic caching layer for API query results.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Caches query results under a hashed key with a freshness timestamp
//! - De-duplicates concurrent fetches of the same key
//! - Optionally serves stale data while revalidating in the background
//! - Provides basic offline mode (serve stale cache when network unavailable)

mod coalesce;
mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, QueryOptions};
pub use storage::{MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, QueryKey};
