//! Infinite-scroll assembly of the card feed.
//!
//! A feed is an ordered run of pages read through the query cache. Page 1 is
//! a bulk load; later pages are smaller scroll loads. Loaded pages are never
//! reconciled: a page is appended as the server returned it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::board::cache::PageRequest;
use crate::board::cached_client::BoardClient;
use crate::board::types::{Card, FeedPage};
use crate::error::BoardError;
use crate::filter::{Filter, FilterState};

/// Page sizes for the bulk first load and the scroll loads after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
  pub initial: u32,
  pub size: u32,
}

impl PageSizes {
  pub fn new(initial: u32, size: u32) -> Self {
    Self { initial, size }
  }

  /// Where logical page `number` (1-based) sits in the result set.
  pub fn request(&self, number: u32) -> PageRequest {
    if number <= 1 {
      return PageRequest {
        number: 1,
        size: self.initial,
        offset: 0,
      };
    }
    PageRequest {
      number,
      size: self.size,
      offset: u64::from(self.initial) + u64::from(number - 2) * u64::from(self.size),
    }
  }
}

impl Default for PageSizes {
  fn default() -> Self {
    Self::new(100, 20)
  }
}

/// Opens feeds over a shared [`BoardClient`].
#[derive(Clone)]
pub struct FeedAssembler {
  client: BoardClient,
  sizes: PageSizes,
}

impl FeedAssembler {
  pub fn new(client: BoardClient, sizes: PageSizes) -> Self {
    Self { client, sizes }
  }

  /// A feed for a fixed filter; change it with [`FeedHandle::set_filter`].
  pub fn open_feed(&self, filter: Filter) -> FeedHandle {
    FeedHandle::new(self.client.clone(), self.sizes, filter, None)
  }

  /// A feed that follows the filter store and restarts whenever it changes.
  pub fn follow(&self, filters: &FilterState) -> FeedHandle {
    let mut receiver = filters.subscribe();
    let filter = receiver.borrow_and_update().clone();
    FeedHandle::new(self.client.clone(), self.sizes, filter, Some(receiver))
  }
}

struct FeedState {
  filter: Filter,
  /// Bumped whenever the filter changes; results of older loads are dropped
  generation: u64,
  pages: Vec<FeedPage>,
  has_more: bool,
  loading: bool,
  error: Option<BoardError>,
  follow: Option<watch::Receiver<Filter>>,
}

impl FeedState {
  fn reset(&mut self, filter: Filter) {
    debug!(from = %self.filter, to = %filter, "feed filter changed, discarding pages");
    self.filter = filter;
    self.generation += 1;
    self.pages.clear();
    self.has_more = true;
    self.loading = false;
    self.error = None;
  }

  /// Pick up a change made through the followed filter store.
  fn sync_filter(&mut self) {
    let Some(receiver) = self.follow.as_mut() else {
      return;
    };
    if !receiver.has_changed().unwrap_or(false) {
      return;
    }
    let filter = receiver.borrow_and_update().clone();
    if filter != self.filter {
      self.reset(filter);
    }
  }
}

/// Clears the loading flag if a load is dropped before it finishes.
struct LoadingGuard {
  state: Arc<Mutex<FeedState>>,
  generation: u64,
  done: bool,
}

impl LoadingGuard {
  fn new(state: &Arc<Mutex<FeedState>>, generation: u64) -> Self {
    Self {
      state: Arc::clone(state),
      generation,
      done: false,
    }
  }

  fn finish(&mut self) {
    self.done = true;
  }
}

impl Drop for LoadingGuard {
  fn drop(&mut self) {
    if self.done {
      return;
    }
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.generation == self.generation && state.loading {
      debug!("feed load abandoned");
      state.loading = false;
    }
  }
}

/// Handle to one assembled feed. Clones share the same pages.
#[derive(Clone)]
pub struct FeedHandle {
  client: BoardClient,
  sizes: PageSizes,
  state: Arc<Mutex<FeedState>>,
}

impl FeedHandle {
  fn new(
    client: BoardClient,
    sizes: PageSizes,
    filter: Filter,
    follow: Option<watch::Receiver<Filter>>,
  ) -> Self {
    Self {
      client,
      sizes,
      state: Arc::new(Mutex::new(FeedState {
        filter,
        generation: 0,
        pages: Vec::new(),
        has_more: true,
        loading: false,
        error: None,
        follow,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, FeedState> {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.sync_filter();
    state
  }

  pub fn filter(&self) -> Filter {
    self.lock().filter.clone()
  }

  /// Loaded cards, page by page in page order.
  pub fn items(&self) -> Vec<Card> {
    self
      .lock()
      .pages
      .iter()
      .flat_map(|page| page.cards.iter().cloned())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.lock().pages.iter().map(|page| page.cards.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn pages_loaded(&self) -> usize {
    self.lock().pages.len()
  }

  pub fn has_more(&self) -> bool {
    self.lock().has_more
  }

  pub fn is_loading_more(&self) -> bool {
    self.lock().loading
  }

  /// Total reported by the most recently loaded page.
  pub fn total_count(&self) -> Option<u64> {
    self.lock().pages.last().map(|page| page.total)
  }

  pub fn last_error(&self) -> Option<BoardError> {
    self.lock().error.clone()
  }

  /// Switch to another filter, discarding every loaded page.
  ///
  /// Returns whether the filter changed.
  pub fn set_filter(&self, filter: Filter) -> bool {
    let mut state = self.lock();
    if state.filter == filter {
      return false;
    }
    state.reset(filter);
    true
  }

  /// Load the page after the last loaded one.
  ///
  /// Returns `Ok(true)` when a page was appended. Does nothing when no more
  /// pages exist or a load is already running. A failed load appends nothing
  /// and can be retried.
  pub async fn load_more(&self) -> Result<bool, BoardError> {
    let (filter, page, generation) = {
      let mut state = self.lock();
      if state.loading || !state.has_more {
        return Ok(false);
      }
      state.loading = true;
      let page = self.sizes.request(state.pages.len() as u32 + 1);
      (state.filter.clone(), page, state.generation)
    };
    let mut guard = LoadingGuard::new(&self.state, generation);

    // Keyed by the filter captured above, never the live one
    let result = self.client.feed_page(&filter, page).await;

    guard.finish();
    let mut state = self.lock();
    if state.generation != generation {
      debug!(page = page.number, "filter changed during load, dropping page");
      return Ok(false);
    }
    state.loading = false;

    match result.into_result() {
      Ok(loaded) => {
        info!(
          page = page.number,
          items = loaded.cards.len(),
          total = loaded.total,
          has_more = loaded.has_more,
          "feed page loaded"
        );
        state.has_more = loaded.has_more;
        state.error = None;
        state.pages.push(loaded);
        Ok(true)
      }
      Err(err) => {
        debug!(page = page.number, error = %err, "feed page failed");
        state.error = Some(err.clone());
        Err(err)
      }
    }
  }

  /// Re-read every loaded page in order so invalidated pages refetch.
  ///
  /// Fresh pages come from the cache. On failure the pages loaded before
  /// stay in place.
  pub async fn refresh(&self) -> Result<(), BoardError> {
    let (filter, count, generation) = {
      let mut state = self.lock();
      if state.loading {
        return Ok(());
      }
      state.loading = true;
      (state.filter.clone(), state.pages.len().max(1), state.generation)
    };
    let mut guard = LoadingGuard::new(&self.state, generation);

    let mut pages = Vec::with_capacity(count);
    let mut failure = None;
    for number in 1..=count as u32 {
      match self
        .client
        .feed_page(&filter, self.sizes.request(number))
        .await
        .into_result()
      {
        Ok(page) => {
          let has_more = page.has_more;
          pages.push(page);
          if !has_more {
            break;
          }
        }
        Err(err) => {
          failure = Some(err);
          break;
        }
      }
    }

    guard.finish();
    let mut state = self.lock();
    if state.generation != generation {
      return Ok(());
    }
    state.loading = false;

    if let Some(err) = failure {
      state.error = Some(err.clone());
      return Err(err);
    }

    debug!(pages = pages.len(), "feed refreshed");
    state.has_more = pages.last().map_or(true, |page| page.has_more);
    state.pages = pages;
    state.error = None;
    Ok(())
  }
}

impl std::fmt::Debug for FeedHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock();
    f.debug_struct("FeedHandle")
      .field("filter", &state.filter)
      .field("pages", &state.pages.len())
      .field("has_more", &state.has_more)
      .field("loading", &state.loading)
      .finish()
  }
}
