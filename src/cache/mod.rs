//! Generic query cache for server reads.
//!
//! This module provides a board-agnostic caching mechanism that:
//! - Maps deterministic keys to the last fetched value and its fetch time
//! - Shares one in-flight request between concurrent readers of a key
//! - Serves fresh values without a network call, refetches stale ones
//! - Invalidates by exact key or key prefix after writes
//! - Keeps the last good value when a refetch fails

mod layer;
mod traits;

pub use layer::{CacheEntry, QueryCache};
pub use traits::{
  CacheKey, CacheSource, CachedResult, Cacheable, KeyPattern, QueryKey, QueryStatus,
};
