//! Feed filter and the store that holds the active one.
//!
//! The store is the single source of truth for the current filter. It makes no
//! network calls; feeds following it read the new value before their next load
//! and restart at page 1 whenever it changed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::board::types::{CardStatus, CardType, SortOrder};

/// Sort, type, status and free-text query for the card feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
  pub sort: SortOrder,
  /// `None` means any type
  pub card_type: Option<CardType>,
  /// `None` means any status
  pub status: Option<CardStatus>,
  pub query: String,
}

impl Filter {
  pub fn with_sort(mut self, sort: SortOrder) -> Self {
    self.sort = sort;
    self
  }

  pub fn with_type(mut self, card_type: Option<CardType>) -> Self {
    self.card_type = card_type;
    self
  }

  pub fn with_status(mut self, status: Option<CardStatus>) -> Self {
    self.status = status;
    self
  }

  pub fn with_query(mut self, query: impl Into<String>) -> Self {
    self.query = normalize_query(&query.into());
    self
  }
}

impl fmt::Display for Filter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sort={}", self.sort)?;
    if let Some(card_type) = self.card_type {
      write!(f, " type={}", card_type)?;
    }
    if let Some(status) = self.status {
      write!(f, " status={}", status)?;
    }
    if !self.query.is_empty() {
      write!(f, " query={:?}", self.query)?;
    }
    Ok(())
  }
}

pub(crate) fn normalize_query(query: &str) -> String {
  query.trim().to_string()
}

/// Holder of the active filter with change notification.
pub struct FilterState {
  tx: watch::Sender<Filter>,
}

impl FilterState {
  pub fn new(initial: Filter) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  pub fn current(&self) -> Filter {
    self.tx.borrow().clone()
  }

  /// Receiver that observes every change made through the setters.
  pub fn subscribe(&self) -> watch::Receiver<Filter> {
    self.tx.subscribe()
  }

  pub fn set_sort(&self, sort: SortOrder) -> bool {
    self.update(|f| replace(&mut f.sort, sort))
  }

  pub fn set_type(&self, card_type: Option<CardType>) -> bool {
    self.update(|f| replace(&mut f.card_type, card_type))
  }

  pub fn set_status(&self, status: Option<CardStatus>) -> bool {
    self.update(|f| replace(&mut f.status, status))
  }

  pub fn set_query(&self, query: &str) -> bool {
    let query = normalize_query(query);
    self.update(|f| replace(&mut f.query, query))
  }

  /// Replace the whole filter at once.
  pub fn set(&self, filter: Filter) -> bool {
    self.update(|f| replace(f, filter))
  }

  /// Returns whether the filter changed; unchanged writes notify nobody.
  fn update(&self, modify: impl FnOnce(&mut Filter) -> bool) -> bool {
    let changed = self.tx.send_if_modified(modify);
    if changed {
      debug!(filter = %self.current(), "filter changed");
    }
    changed
  }
}

impl Default for FilterState {
  fn default() -> Self {
    Self::new(Filter::default())
  }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
  if *slot == value {
    return false;
  }
  *slot = value;
  true
}
