//! Writes against the board and the cache keys each one invalidates.
//!
//! Preconditions are checked before any request goes out. Invalidation runs
//! only after the server accepted the write; a failed write leaves the cache
//! exactly as it was.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::board::client::BoardApi;
use crate::board::types::{
  Attachment, Card, CardId, CardStatus, Comment, CommentId, Identity, NewCard, NewComment,
  VoteValue,
};
use crate::cache::{KeyPattern, QueryCache};
use crate::error::BoardError;
use crate::session::SessionStore;

/// A write and the card it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  CreateCard,
  Vote { card_id: CardId },
  CreateComment { card_id: CardId },
  DeleteComment { card_id: CardId },
  DeleteCard { card_id: CardId },
  UpdateStatus { card_id: CardId },
}

impl Mutation {
  /// Keys to mark stale once the write succeeded.
  pub fn invalidates(&self) -> Vec<KeyPattern> {
    match *self {
      Mutation::CreateCard => vec![KeyPattern::all_feeds()],
      Mutation::Vote { card_id } => vec![KeyPattern::all_feeds(), KeyPattern::card_detail(card_id)],
      Mutation::CreateComment { card_id } => vec![KeyPattern::card_detail(card_id)],
      Mutation::DeleteComment { card_id } => vec![KeyPattern::card_detail(card_id)],
      // The detail view is torn down after a delete
      Mutation::DeleteCard { .. } => vec![KeyPattern::all_feeds()],
      Mutation::UpdateStatus { card_id } => {
        vec![KeyPattern::all_feeds(), KeyPattern::card_detail(card_id)]
      }
    }
  }

  fn name(&self) -> &'static str {
    match self {
      Mutation::CreateCard => "create_card",
      Mutation::Vote { .. } => "vote",
      Mutation::CreateComment { .. } => "create_comment",
      Mutation::DeleteComment { .. } => "delete_comment",
      Mutation::DeleteCard { .. } => "delete_card",
      Mutation::UpdateStatus { .. } => "update_status",
    }
  }
}

/// The vote to send when `clicked` is pressed while `current` is active.
///
/// Pressing the active value again toggles it off.
pub fn vote_to_send(current: Option<VoteValue>, clicked: VoteValue) -> VoteValue {
  if current == Some(clicked) {
    VoteValue::None
  } else {
    clicked
  }
}

/// Runs board writes and keeps the cache consistent with them.
#[derive(Clone)]
pub struct MutationCoordinator {
  api: Arc<dyn BoardApi>,
  cache: QueryCache,
  session: SessionStore,
}

impl MutationCoordinator {
  pub fn new(api: Arc<dyn BoardApi>, cache: QueryCache, session: SessionStore) -> Self {
    Self {
      api,
      cache,
      session,
    }
  }

  /// Create a card. It shows up in feeds once they refetch.
  pub async fn create_card(&self, input: NewCard) -> Result<Card, BoardError> {
    let input = NewCard {
      title: input.title.trim().to_string(),
      ..input
    };
    if input.title.is_empty() {
      return Err(BoardError::Validation("title must not be empty".to_string()));
    }

    let api = Arc::clone(&self.api);
    self
      .run(Mutation::CreateCard, async move { api.create_card(&input).await })
      .await
  }

  /// Vote on `card` as the viewer. Clicking the active value toggles it off.
  pub async fn vote(&self, card: &Card, clicked: VoteValue) -> Result<Card, BoardError> {
    self.require_identity(true)?;
    let value = vote_to_send(card.viewer_vote, clicked);
    self.send_vote(card.id, value).await
  }

  /// Withdraw the viewer's vote on a card.
  pub async fn remove_vote(&self, card_id: CardId) -> Result<Card, BoardError> {
    self.require_identity(true)?;
    self.send_vote(card_id, VoteValue::None).await
  }

  async fn send_vote(&self, card_id: CardId, value: VoteValue) -> Result<Card, BoardError> {
    let api = Arc::clone(&self.api);
    self
      .run(Mutation::Vote { card_id }, async move {
        api.vote(card_id, value).await
      })
      .await
  }

  /// Comment on a card. Content is trimmed; an empty comment needs attachments.
  pub async fn create_comment(
    &self,
    card_id: CardId,
    input: NewComment,
  ) -> Result<Comment, BoardError> {
    self.require_identity(true)?;
    let input = NewComment {
      content: input.content.trim().to_string(),
      attachments: input.attachments,
    };
    if input.content.is_empty() && input.attachments.is_empty() {
      return Err(BoardError::Validation(
        "comment needs text or attachments".to_string(),
      ));
    }

    let api = Arc::clone(&self.api);
    self
      .run(Mutation::CreateComment { card_id }, async move {
        api.create_comment(card_id, &input).await
      })
      .await
  }

  /// Delete a comment; `card_id` is the card whose detail shows it.
  pub async fn delete_comment(
    &self,
    card_id: CardId,
    comment_id: CommentId,
  ) -> Result<(), BoardError> {
    self.require_admin()?;
    let api = Arc::clone(&self.api);
    self
      .run(Mutation::DeleteComment { card_id }, async move {
        api.delete_comment(comment_id).await
      })
      .await
  }

  /// Delete a card. Callers should leave its detail view afterwards.
  pub async fn delete_card(&self, card_id: CardId) -> Result<(), BoardError> {
    self.require_admin()?;
    let api = Arc::clone(&self.api);
    self
      .run(Mutation::DeleteCard { card_id }, async move {
        api.delete_card(card_id).await
      })
      .await
  }

  pub async fn update_status(
    &self,
    card_id: CardId,
    status: CardStatus,
  ) -> Result<Card, BoardError> {
    self.require_admin()?;
    let api = Arc::clone(&self.api);
    self
      .run(Mutation::UpdateStatus { card_id }, async move {
        api.update_card_status(card_id, status).await
      })
      .await
  }

  /// Upload a file for use as a card or comment attachment. Touches no cache key.
  pub async fn upload_attachment(
    &self,
    filename: &str,
    bytes: Vec<u8>,
  ) -> Result<Attachment, BoardError> {
    self.require_identity(false)?;
    self.api.upload_attachment(filename, bytes).await
  }

  fn require_identity(&self, prompt: bool) -> Result<Identity, BoardError> {
    match self.session.identity() {
      Some(identity) => Ok(identity),
      None => {
        if prompt {
          self.session.open_login_prompt();
        }
        Err(BoardError::AuthRequired)
      }
    }
  }

  fn require_admin(&self) -> Result<Identity, BoardError> {
    let identity = self.require_identity(false)?;
    if !identity.is_admin {
      return Err(BoardError::AdminRequired);
    }
    Ok(identity)
  }

  /// Send the write, then invalidate its keys if it succeeded.
  async fn run<T, Fut>(&self, mutation: Mutation, request: Fut) -> Result<T, BoardError>
  where
    Fut: Future<Output = Result<T, BoardError>>,
  {
    match request.await {
      Ok(value) => {
        let patterns = mutation.invalidates();
        let matched: usize = patterns.iter().map(|p| self.cache.invalidate(p)).sum();
        info!(mutation = mutation.name(), matched, "mutation applied");
        Ok(value)
      }
      Err(err) => {
        warn!(mutation = mutation.name(), error = %err, "mutation failed");
        Err(err)
      }
    }
  }
}
