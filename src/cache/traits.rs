//! Core traits and types for the query cache.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::BoardError;

/// Trait for values that can live in the query cache.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Value type name for logging (e.g., "feed_page", "card_detail")
  fn entity_type() -> &'static str;
}

/// Deterministic cache key, e.g. `feed:3fa1...` or `card-detail:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A typed description of one cached read.
pub trait QueryKey {
  /// Stable key; logically equal parameter sets must produce equal keys.
  fn cache_key(&self) -> CacheKey;

  /// Human readable form for logs.
  fn description(&self) -> String;
}

/// Selects entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  Exact(CacheKey),
  Prefix(String),
}

impl KeyPattern {
  pub fn matches(&self, key: &CacheKey) -> bool {
    match self {
      KeyPattern::Exact(exact) => exact == key,
      KeyPattern::Prefix(prefix) => key.as_str().starts_with(prefix.as_str()),
    }
  }
}

impl fmt::Display for KeyPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPattern::Exact(key) => write!(f, "{}", key),
      KeyPattern::Prefix(prefix) => write!(f, "{}*", prefix),
    }
  }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStatus {
  #[default]
  Idle,
  Pending,
  Success,
  Error,
}

/// Result from a cache read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CachedResult<T> {
  /// The data, if any was ever fetched successfully
  pub data: Option<T>,
  pub status: QueryStatus,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched
  pub fetched_at: Option<DateTime<Utc>>,
  /// Failure of the most recent fetch
  pub error: Option<BoardError>,
}

impl<T> CachedResult<T> {
  /// Create a new result from fresh network data.
  pub fn from_network(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data: Some(data),
      status: QueryStatus::Success,
      source: CacheSource::Network,
      fetched_at: Some(fetched_at),
      error: None,
    }
  }

  /// Create a new result from cached data still inside the stale window.
  pub fn from_cache(data: T, fetched_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data: Some(data),
      status: QueryStatus::Success,
      source: CacheSource::CacheFresh,
      fetched_at,
      error: None,
    }
  }

  /// Create a failed result that still carries the last good data, if any.
  pub fn failed(error: BoardError, previous: Option<T>, fetched_at: Option<DateTime<Utc>>) -> Self {
    let source = if previous.is_some() {
      CacheSource::CacheStale
    } else {
      CacheSource::None
    };
    Self {
      data: previous,
      status: QueryStatus::Error,
      source,
      fetched_at,
      error: Some(error),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Data of a successful read, or the failure that prevented it.
  pub fn into_result(self) -> Result<T, BoardError> {
    match (self.error, self.data) {
      (Some(err), _) => Err(err),
      (None, Some(data)) => Ok(data),
      (None, None) => Err(BoardError::Decode("cache read returned no data".to_string())),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Refetch failed; serving the last good data
  CacheStale,
  /// Nothing to serve
  None,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pattern_matching() {
    let key = CacheKey::new("card-detail:42");
    assert!(KeyPattern::Exact(CacheKey::new("card-detail:42")).matches(&key));
    assert!(!KeyPattern::Exact(CacheKey::new("card-detail:4")).matches(&key));
    assert!(KeyPattern::Prefix("card-detail:".into()).matches(&key));
    assert!(!KeyPattern::Prefix("feed:".into()).matches(&key));
  }

  #[test]
  fn test_failed_result_keeps_previous_data() {
    let result = CachedResult::failed(BoardError::network("down"), Some(5), None);
    assert_eq!(result.source, CacheSource::CacheStale);
    assert_eq!(result.data, Some(5));
    assert!(result.into_result().is_err());

    let result: CachedResult<i32> = CachedResult::failed(BoardError::network("down"), None, None);
    assert_eq!(result.source, CacheSource::None);
  }
}
