//! In-memory query cache with request deduplication and pattern invalidation.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::traits::{CacheKey, CachedResult, Cacheable, KeyPattern, QueryKey, QueryStatus};
use crate::error::BoardError;

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, BoardError>>>;

struct InFlight {
  id: u64,
  /// Entry epoch when the request started
  epoch: u64,
  fetch: SharedFetch,
}

#[derive(Default)]
struct Entry {
  data: Option<AnyValue>,
  fetched_at: Option<DateTime<Utc>>,
  status: QueryStatus,
  error: Option<BoardError>,
  invalidated: bool,
  /// Bumped on every invalidation
  epoch: u64,
  in_flight: Option<InFlight>,
  last_read: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
  entries: HashMap<CacheKey, Entry>,
  next_request_id: u64,
  last_sweep: DateTime<Utc>,
}

impl CacheState {
  /// Drop entries nobody has read for `gc_time`, at most once per `gc_time`.
  fn sweep(&mut self, now: DateTime<Utc>, gc_time: Duration) {
    if now - self.last_sweep < gc_time {
      return;
    }
    self.last_sweep = now;
    let before = self.entries.len();
    self
      .entries
      .retain(|_, entry| entry.in_flight.is_some() || now - entry.last_read <= gc_time);
    let evicted = before - self.entries.len();
    if evicted > 0 {
      debug!(evicted, remaining = self.entries.len(), "evicted idle entries");
    }
  }
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub key: CacheKey,
  pub data: Option<T>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub status: QueryStatus,
  pub error: Option<BoardError>,
  /// Next read refetches regardless of age
  pub invalidated: bool,
}

/// Process-wide cache of server reads.
///
/// Cheap to clone; clones share the same entries. The internal lock is never
/// held across an await, so every entry update is atomic with respect to
/// other tasks. Entries unread for the gc time are evicted on a later read.
pub struct QueryCache {
  state: Arc<Mutex<CacheState>>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  /// How long an unread entry is kept
  gc_time: Duration,
}

impl QueryCache {
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(CacheState::default())),
      stale_time: Duration::seconds(60),
      gc_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Set how long an entry survives without being read.
  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  pub fn gc_time(&self) -> Duration {
    self.gc_time
  }

  pub fn stale_time(&self) -> Duration {
    self.stale_time
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_fresh(&self, entry: &Entry) -> bool {
    if entry.invalidated || entry.status != QueryStatus::Success || entry.data.is_none() {
      return false;
    }
    entry
      .fetched_at
      .map(|at| Utc::now() - at <= self.stale_time)
      .unwrap_or(false)
  }

  /// Read a key with cache-first strategy.
  ///
  /// 1. If a request started since the last invalidation is in flight, join it
  /// 2. If the entry is fresh, return it without a network call
  /// 3. Otherwise call `fetcher` and store the result
  /// 4. On failure keep the previous data and report the error
  pub async fn read<K, T, F, Fut>(&self, key: &K, fetcher: F) -> CachedResult<T>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BoardError>> + Send + 'static,
  {
    let cache_key = key.cache_key();

    let pending = {
      let mut state = self.lock();
      let now = Utc::now();
      state.sweep(now, self.gc_time);
      let request_id = state.next_request_id;
      let entry = state.entries.entry(cache_key.clone()).or_default();
      entry.last_read = now;

      // A request started before an invalidation may return pre-write data
      let joinable = entry
        .in_flight
        .as_ref()
        .filter(|in_flight| in_flight.epoch == entry.epoch)
        .map(|in_flight| in_flight.fetch.clone());

      if let Some(fetch) = joinable {
        debug!(key = %cache_key, "joining in-flight request");
        fetch
      } else {
        if entry.in_flight.is_some() {
          debug!(key = %cache_key, "in-flight request predates invalidation, refetching");
        }
        if self.is_fresh(entry) {
          if let Some(data) = entry.data.as_ref().and_then(downcast::<T>) {
            debug!(key = %cache_key, "cache hit");
            return CachedResult::from_cache(data, entry.fetched_at);
          }
          warn!(key = %cache_key, expected = T::entity_type(), "cached value has unexpected type");
        }

        debug!(key = %cache_key, query = %key.description(), "fetching");
        let fetch = self.start_fetch::<T, Fut>(cache_key.clone(), entry, request_id, fetcher());
        state.next_request_id += 1;
        fetch
      }
    };

    let outcome = pending.await;

    let state = self.lock();
    let entry = state.entries.get(&cache_key);
    match outcome {
      Ok(value) => match downcast::<T>(&value) {
        Some(data) => {
          let fetched_at = entry.and_then(|e| e.fetched_at).unwrap_or_else(Utc::now);
          CachedResult::from_network(data, fetched_at)
        }
        None => CachedResult::failed(
          BoardError::Decode(format!(
            "cached value for {} is not a {}",
            cache_key,
            T::entity_type()
          )),
          None,
          None,
        ),
      },
      Err(err) => {
        let previous = entry.and_then(|e| e.data.as_ref()).and_then(downcast::<T>);
        CachedResult::failed(err, previous, entry.and_then(|e| e.fetched_at))
      }
    }
  }

  /// Wrap the request in a shared future that settles the entry exactly once.
  fn start_fetch<T, Fut>(&self, key: CacheKey, entry: &mut Entry, id: u64, request: Fut) -> SharedFetch
  where
    T: Cacheable,
    Fut: Future<Output = Result<T, BoardError>> + Send + 'static,
  {
    let state = Arc::clone(&self.state);
    let started_epoch = entry.epoch;

    let task = async move {
      let result = request.await.map(|data| Arc::new(data) as AnyValue);
      settle(&state, &key, id, started_epoch, &result);
      result
    }
    .boxed()
    .shared();

    entry.status = QueryStatus::Pending;
    entry.in_flight = Some(InFlight {
      id,
      epoch: started_epoch,
      fetch: task.clone(),
    });
    task
  }

  /// Mark every entry matching `pattern` as stale. Returns how many matched.
  pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
    let mut state = self.lock();
    let mut matched = 0;
    for (key, entry) in state.entries.iter_mut() {
      if pattern.matches(key) {
        entry.invalidated = true;
        entry.epoch += 1;
        matched += 1;
      }
    }
    debug!(pattern = %pattern, matched, "invalidated");
    matched
  }

  /// Snapshot of an entry, if the key was ever read.
  pub fn get_entry<T: Cacheable>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
    let state = self.lock();
    let entry = state.entries.get(key)?;
    Some(CacheEntry {
      key: key.clone(),
      data: entry.data.as_ref().and_then(downcast::<T>),
      fetched_at: entry.fetched_at,
      status: entry.status,
      error: entry.error.clone(),
      invalidated: entry.invalidated,
    })
  }

  /// True when the next read of `key` would hit the network.
  pub fn is_stale(&self, key: &CacheKey) -> bool {
    let state = self.lock();
    state
      .entries
      .get(key)
      .map(|entry| !self.is_fresh(entry))
      .unwrap_or(true)
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl Clone for QueryCache {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
      stale_time: self.stale_time,
      gc_time: self.gc_time,
    }
  }
}

fn downcast<T: Cacheable>(value: &AnyValue) -> Option<T> {
  value.downcast_ref::<T>().cloned()
}

/// Apply a finished request to its entry, keyed by the key captured when it started.
fn settle(
  state: &Mutex<CacheState>,
  key: &CacheKey,
  id: u64,
  started_epoch: u64,
  result: &Result<AnyValue, BoardError>,
) {
  let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
  let Some(entry) = state.entries.get_mut(key) else {
    return;
  };
  if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
    return;
  }
  entry.in_flight = None;

  match result {
    Ok(value) => {
      entry.data = Some(Arc::clone(value));
      entry.fetched_at = Some(Utc::now());
      entry.status = QueryStatus::Success;
      entry.error = None;
      // Invalidated while the request was out: the data may predate the write.
      entry.invalidated = entry.epoch != started_epoch;
    }
    Err(err) => {
      debug!(key = %key, error = %err, "fetch failed");
      entry.status = QueryStatus::Error;
      entry.error = Some(err.clone());
    }
  }
}
