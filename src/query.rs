//! Event-loop subscriptions to cached reads.
//!
//! A [`Query`] runs its read through the shared [`QueryCache`] on a background
//! task; the owner polls it once per tick and redraws when `poll` says so.
//!
//! ```ignore
//! let mut detail = board.card_detail_query(42);
//! detail.fetch();
//!
//! // every tick
//! if detail.poll() {
//!     match detail.state() {
//!         QueryState::Success(card) => show(card),
//!         QueryState::Error { error, stale } => show_failure(error, stale.as_ref()),
//!         QueryState::Loading | QueryState::Idle => {}
//!     }
//! }
//! ```

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use crate::board::cache::BoardQueryKey;
use crate::cache::{CachedResult, Cacheable, KeyPattern, QueryCache, QueryKey};
use crate::error::BoardError;

/// Where a subscription stands
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Never fetched
  Idle,
  Loading,
  Success(T),
  /// Query failed; `stale` holds the last good data, if any
  Error { error: BoardError, stale: Option<T> },
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error { .. })
  }

  /// Fresh data, or the stale data kept after a failure.
  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      QueryState::Error { stale, .. } => stale.as_ref(),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&BoardError> {
    match self {
      QueryState::Error { error, .. } => Some(error),
      _ => None,
    }
  }
}

impl<T> From<CachedResult<T>> for QueryState<T> {
  fn from(result: CachedResult<T>) -> Self {
    match (result.error, result.data) {
      (Some(error), stale) => QueryState::Error { error, stale },
      (None, Some(data)) => QueryState::Success(data),
      (None, None) => QueryState::Error {
        error: BoardError::Decode("query settled without data".to_string()),
        stale: None,
      },
    }
  }
}

/// Builds the request future each time the cache asks for one
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, BoardError>> + Send + Sync>;

/// Subscription to one cache key.
///
/// Every subscription to the same key shares the cache entry, so two
/// subscribers fetching at once cause a single request.
pub struct Query<T> {
  state: QueryState<T>,
  cache: QueryCache,
  key: BoardQueryKey,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<CachedResult<T>>>,
}

impl<T: Cacheable> Query<T> {
  /// Create a new query for `key`.
  ///
  /// The fetcher is only called when the cache decides a request is needed.
  pub fn new<F, Fut>(cache: QueryCache, key: BoardQueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoardError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      cache,
      key,
      fetcher: Box::new(move || fetcher().boxed()),
      receiver: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&BoardError> {
    self.state.error()
  }

  pub fn key(&self) -> &BoardQueryKey {
    &self.key
  }

  /// Start a read unless one is already running.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Mark the key stale and read it again.
  pub fn refetch(&mut self) {
    self
      .cache
      .invalidate(&KeyPattern::Exact(self.key.cache_key()));
    // Drop any pending result; the new read supersedes it
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results from a pending read.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.state = result.into();
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // The read task died before reporting
        self.state = QueryState::Error {
          error: BoardError::network("query was cancelled"),
          stale: self.state.data().cloned(),
        };
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let cache = self.cache.clone();
    let key = self.key.clone();
    let request = (self.fetcher)();
    tokio::spawn(async move {
      let result = cache.read(&key, move || request).await;
      // The query may have been dropped or refetched meanwhile
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::board::types::FeedPage;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn key() -> BoardQueryKey {
    BoardQueryKey::Feed {
      filter: Default::default(),
      page: crate::board::cache::PageRequest {
        number: 1,
        size: 20,
        offset: 0,
      },
    }
  }

  fn page(total: u64) -> FeedPage {
    FeedPage {
      cards: Vec::new(),
      total,
      has_more: false,
    }
  }

  fn counting_query(cache: &QueryCache, counter: &Arc<AtomicU32>) -> Query<FeedPage> {
    let counter = Arc::clone(counter);
    Query::new(cache.clone(), key(), move || {
      let counter = Arc::clone(&counter);
      async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(page(u64::from(n)))
      }
    })
  }

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(QueryCache::new(), key(), || async { Ok(page(3)) });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_success());
    assert_eq!(query.data().map(|p| p.total), Some(3));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<FeedPage> = Query::new(QueryCache::new(), key(), || async {
      Err(BoardError::http(500, "Error loading cards"))
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert_eq!(query.error().and_then(|e| e.status()), Some(500));
    assert!(query.data().is_none());
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&QueryCache::new(), &counter);

    query.fetch();
    assert!(query.is_loading());
    query.fetch();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(query.poll());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_subscribers_share_one_request() {
    let cache = QueryCache::new();
    let counter = Arc::new(AtomicU32::new(0));
    let mut first = counting_query(&cache, &counter);
    let mut second = counting_query(&cache, &counter);

    first.fetch();
    second.fetch();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(first.poll());
    assert!(second.poll());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(first.data(), second.data());
  }

  #[tokio::test]
  async fn test_refetch_bypasses_fresh_cache() {
    let cache = QueryCache::new();
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(60)).await;
    query.poll();

    query.refetch();
    tokio::time::sleep(Duration::from_millis(60)).await;
    query.poll();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(query.data().map(|p| p.total), Some(2));
  }
}
