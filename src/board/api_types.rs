//! Serde-deserializable types matching the board server's JSON API.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
  Attachment, AttachmentKind, Card, CardDetail, CardStatus, CardType, Comment, FeedPage,
  Identity, PublicConfig, VoteValue,
};
use crate::error::BoardError;

/// Go's `omitempty` drops empty strings, but older rows may still carry them.
fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.is_empty())
}

// ============================================================================
// Users and sessions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: i64,
  #[serde(default)]
  pub first_name: String,
  pub last_name: Option<String>,
  pub username: Option<String>,
  pub photo_url: Option<String>,
  #[serde(default)]
  pub is_admin: bool,
}

impl From<ApiUser> for Identity {
  fn from(user: ApiUser) -> Self {
    Identity {
      id: user.id,
      first_name: user.first_name,
      last_name: non_empty(user.last_name),
      username: non_empty(user.username),
      avatar_url: non_empty(user.photo_url),
      is_admin: user.is_admin,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiOk {
  #[serde(default)]
  pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
  #[serde(default)]
  pub bot_username: String,
}

impl From<ApiConfig> for PublicConfig {
  fn from(config: ApiConfig) -> Self {
    PublicConfig {
      bot_username: config.bot_username,
    }
  }
}

// ============================================================================
// Cards and comments
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCard {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "type")]
  pub card_type: CardType,
  pub status: CardStatus,
  #[serde(default)]
  pub images: Option<Vec<String>>,
  #[serde(default)]
  pub rating: i64,
  #[serde(default)]
  pub likes: i64,
  #[serde(default)]
  pub dislikes: i64,
  pub created_at: DateTime<Utc>,
  pub author: Option<ApiUser>,
  #[serde(default)]
  pub comment_count: i64,
  #[serde(default)]
  pub user_vote: Option<i8>,
}

impl ApiCard {
  pub fn into_domain(self) -> Result<Card, BoardError> {
    let viewer_vote = self
      .user_vote
      .map(VoteValue::try_from)
      .transpose()
      .map_err(BoardError::Decode)?;

    Ok(Card {
      id: self.id,
      title: self.title,
      description: self.description,
      card_type: self.card_type,
      status: self.status,
      attachments: self.images.unwrap_or_default(),
      score: self.rating,
      up_count: self.likes,
      down_count: self.dislikes,
      created_at: self.created_at,
      author: self.author.map(Identity::from),
      comment_count: self.comment_count,
      viewer_vote,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiComment {
  pub id: i64,
  pub card_id: i64,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub images: Option<Vec<String>>,
  pub created_at: DateTime<Utc>,
  pub author: Option<ApiUser>,
}

impl From<ApiComment> for Comment {
  fn from(comment: ApiComment) -> Self {
    Comment {
      id: comment.id,
      card_id: comment.card_id,
      content: comment.content,
      attachments: comment.images.unwrap_or_default(),
      created_at: comment.created_at,
      author: comment.author.map(Identity::from),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiCardsResponse {
  #[serde(default)]
  pub cards: Option<Vec<ApiCard>>,
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub has_more: bool,
}

impl ApiCardsResponse {
  pub fn into_domain(self) -> Result<FeedPage, BoardError> {
    let cards = self
      .cards
      .unwrap_or_default()
      .into_iter()
      .map(ApiCard::into_domain)
      .collect::<Result<Vec<_>, _>>()?;

    Ok(FeedPage {
      cards,
      total: self.total,
      has_more: self.has_more,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiCardDetailResponse {
  pub card: ApiCard,
  #[serde(default)]
  pub comments: Option<Vec<ApiComment>>,
}

impl ApiCardDetailResponse {
  pub fn into_domain(self) -> Result<CardDetail, BoardError> {
    Ok(CardDetail {
      card: self.card.into_domain()?,
      comments: self
        .comments
        .unwrap_or_default()
        .into_iter()
        .map(Comment::from)
        .collect(),
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiAttachment {
  pub url: String,
  #[serde(rename = "type", default = "default_attachment_kind")]
  pub kind: AttachmentKind,
  #[serde(default)]
  pub filename: String,
}

fn default_attachment_kind() -> AttachmentKind {
  AttachmentKind::File
}

impl From<ApiAttachment> for Attachment {
  fn from(attachment: ApiAttachment) -> Self {
    Attachment {
      url: attachment.url,
      kind: attachment.kind,
      filename: attachment.filename,
    }
  }
}

// ============================================================================
// Request bodies
// ============================================================================

fn no_images(images: &&[String]) -> bool {
  images.is_empty()
}

#[derive(Debug, Serialize)]
pub struct ApiCreateCard<'a> {
  pub title: &'a str,
  pub description: &'a str,
  #[serde(rename = "type")]
  pub card_type: CardType,
  #[serde(skip_serializing_if = "no_images")]
  pub images: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct ApiCreateComment<'a> {
  pub content: &'a str,
  #[serde(skip_serializing_if = "no_images")]
  pub images: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct ApiVote {
  pub value: VoteValue,
}

#[derive(Debug, Serialize)]
pub struct ApiStatusUpdate {
  pub status: CardStatus,
}

#[cfg(test)]
mod tests {
  use super::*;

  const CARD_JSON: &str = r#"{
    "id": 7,
    "user_id": 3,
    "title": "Crash on save",
    "description": "Steps...",
    "type": "issue",
    "status": "fix_coming",
    "images": ["https://cdn.example/a.png"],
    "rating": 4,
    "likes": 5,
    "dislikes": 1,
    "created_at": "2024-03-01T10:20:30.123456Z",
    "author": {"id": 3, "first_name": "Ada", "last_name": "", "auth_date": "2024-01-01T00:00:00Z", "is_admin": false},
    "comment_count": 2,
    "user_vote": -1
  }"#;

  #[test]
  fn test_card_into_domain() {
    let api: ApiCard = serde_json::from_str(CARD_JSON).unwrap();
    let card = api.into_domain().unwrap();

    assert_eq!(card.id, 7);
    assert_eq!(card.status, CardStatus::FixComing);
    assert_eq!(card.score, 4);
    assert_eq!(card.up_count, 5);
    assert_eq!(card.viewer_vote, Some(VoteValue::Down));
    assert_eq!(card.attachments.len(), 1);
    let author = card.author.unwrap();
    assert_eq!(author.last_name, None);
  }

  #[test]
  fn test_missing_vote_and_images() {
    let json = r#"{"id": 1, "title": "t", "type": "suggestion", "status": "open",
      "created_at": "2024-03-01T10:20:30Z"}"#;
    let card = serde_json::from_str::<ApiCard>(json)
      .unwrap()
      .into_domain()
      .unwrap();
    assert_eq!(card.viewer_vote, None);
    assert!(card.attachments.is_empty());
  }

  #[test]
  fn test_cards_response_with_null_cards() {
    let json = r#"{"cards": null, "total": 0, "has_more": false}"#;
    let page = serde_json::from_str::<ApiCardsResponse>(json)
      .unwrap()
      .into_domain()
      .unwrap();
    assert!(page.cards.is_empty());
    assert!(!page.has_more);
  }

  #[test]
  fn test_create_card_body_skips_empty_images() {
    let body = ApiCreateCard {
      title: "t",
      description: "",
      card_type: CardType::Suggestion,
      images: &[],
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["type"], "suggestion");
    assert!(value.get("images").is_none());
  }
}
