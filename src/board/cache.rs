//! Caching implementations for board types.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::cache::{CacheKey, Cacheable, KeyPattern, QueryKey};
use crate::filter::{normalize_query, Filter};

use super::types::{CardDetail, CardId, FeedPage};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for FeedPage {
  fn entity_type() -> &'static str {
    "feed_page"
  }
}

impl Cacheable for CardDetail {
  fn entity_type() -> &'static str {
    "card_detail"
  }
}

// ============================================================================
// Query key types
// ============================================================================

const FEED_PREFIX: &str = "feed:";
const CARD_DETAIL_PREFIX: &str = "card-detail:";

/// Position of one logical feed page in the server's result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
  /// 1-based logical page number
  pub number: u32,
  pub size: u32,
  /// Items before this page
  pub offset: u64,
}

/// Query key types for board reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardQueryKey {
  /// One page of the card feed
  Feed { filter: Filter, page: PageRequest },
  /// A card with its comments
  CardDetail { id: CardId },
}

impl QueryKey for BoardQueryKey {
  fn cache_key(&self) -> CacheKey {
    match self {
      Self::Feed { filter, page } => {
        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        params.insert("sort", filter.sort.to_string());
        if let Some(card_type) = filter.card_type {
          params.insert("type", card_type.to_string());
        }
        if let Some(status) = filter.status {
          params.insert("status", status.to_string());
        }
        let query = normalize_query(&filter.query);
        if !query.is_empty() {
          params.insert("query", query);
        }
        params.insert("page", page.number.to_string());
        params.insert("limit", page.size.to_string());
        params.insert("offset", page.offset.to_string());

        // BTreeMap ordering makes the canonical form independent of field order
        let canonical = params
          .iter()
          .map(|(k, v)| format!("{}={}", k, v))
          .collect::<Vec<_>>()
          .join("&");

        // SHA256 hash for stable, fixed-length keys
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        CacheKey::new(format!("{}{}", FEED_PREFIX, hex::encode(hasher.finalize())))
      }
      Self::CardDetail { id } => CacheKey::new(format!("{}{}", CARD_DETAIL_PREFIX, id)),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Feed { filter, page } => format!("feed page {} ({})", page.number, filter),
      Self::CardDetail { id } => format!("card {}", id),
    }
  }
}

impl KeyPattern {
  /// Every feed page, regardless of filter.
  pub fn all_feeds() -> Self {
    KeyPattern::Prefix(FEED_PREFIX.to_string())
  }

  pub fn card_detail(id: CardId) -> Self {
    KeyPattern::Exact(BoardQueryKey::CardDetail { id }.cache_key())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::board::types::{CardType, SortOrder};

  fn page(number: u32) -> PageRequest {
    PageRequest {
      number,
      size: 20,
      offset: 0,
    }
  }

  fn feed(filter: Filter, number: u32) -> CacheKey {
    BoardQueryKey::Feed {
      filter,
      page: page(number),
    }
    .cache_key()
  }

  #[test]
  fn test_equal_filters_share_a_key() {
    let a = Filter::default()
      .with_type(Some(CardType::Issue))
      .with_query("crash");
    let b = Filter {
      query: "crash".to_string(),
      card_type: Some(CardType::Issue),
      ..Filter::default()
    };
    assert_eq!(feed(a, 1), feed(b, 1));
  }

  #[test]
  fn test_query_whitespace_is_ignored() {
    let a = Filter {
      query: "  crash ".to_string(),
      ..Filter::default()
    };
    let b = Filter::default().with_query("crash");
    assert_eq!(feed(a, 1), feed(b, 1));
  }

  #[test]
  fn test_every_filter_field_changes_the_key() {
    let base = Filter::default();
    let keys = [
      feed(base.clone(), 1),
      feed(base.clone(), 2),
      feed(base.clone().with_sort(SortOrder::Time), 1),
      feed(base.clone().with_type(Some(CardType::Suggestion)), 1),
      feed(
        base.clone().with_status(Some(crate::board::types::CardStatus::Closed)),
        1,
      ),
      feed(base.with_query("x"), 1),
    ];
    for (i, a) in keys.iter().enumerate() {
      for b in keys.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn test_patterns() {
    let feed_key = feed(Filter::default(), 1);
    assert!(feed_key.as_str().starts_with("feed:"));
    assert!(KeyPattern::all_feeds().matches(&feed_key));

    let detail = BoardQueryKey::CardDetail { id: 42 }.cache_key();
    assert_eq!(detail.as_str(), "card-detail:42");
    assert!(KeyPattern::card_detail(42).matches(&detail));
    assert!(!KeyPattern::card_detail(4).matches(&detail));
    assert!(!KeyPattern::all_feeds().matches(&detail));
  }
}
