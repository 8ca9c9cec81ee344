//! Read side of the board: every read goes through the query cache.

use std::sync::Arc;

use crate::cache::{CachedResult, QueryCache};
use crate::filter::Filter;
use crate::query::Query;

use super::cache::{BoardQueryKey, PageRequest};
use super::client::BoardApi;
use super::types::{CardDetail, CardId, FeedPage};

/// Board reads with transparent caching.
///
/// This wraps a [`BoardApi`] and keys every read, so concurrent readers of the
/// same resource share one request and writes can invalidate by key.
#[derive(Clone)]
pub struct BoardClient {
  api: Arc<dyn BoardApi>,
  cache: QueryCache,
}

impl BoardClient {
  pub fn new(api: Arc<dyn BoardApi>, cache: QueryCache) -> Self {
    Self { api, cache }
  }

  pub fn api(&self) -> &Arc<dyn BoardApi> {
    &self.api
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// One feed page. The key is built from the arguments, never from live filter state.
  pub async fn feed_page(&self, filter: &Filter, page: PageRequest) -> CachedResult<FeedPage> {
    let key = BoardQueryKey::Feed {
      filter: filter.clone(),
      page,
    };
    let api = Arc::clone(&self.api);
    let filter = filter.clone();
    self
      .cache
      .read(&key, move || async move { api.fetch_feed(&filter, page).await })
      .await
  }

  /// A card with its comments.
  pub async fn card_detail(&self, id: CardId) -> CachedResult<CardDetail> {
    let key = BoardQueryKey::CardDetail { id };
    let api = Arc::clone(&self.api);
    self
      .cache
      .read(&key, move || async move { api.fetch_card_detail(id).await })
      .await
  }

  /// Non-blocking subscription to a card's detail, for event-loop callers.
  pub fn card_detail_query(&self, id: CardId) -> Query<CardDetail> {
    let api = Arc::clone(&self.api);
    Query::new(
      self.cache.clone(),
      BoardQueryKey::CardDetail { id },
      move || {
        let api = Arc::clone(&api);
        async move { api.fetch_card_detail(id).await }
      },
    )
  }
}
