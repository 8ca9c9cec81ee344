use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CardId = i64;
pub type CommentId = i64;
pub type UserId = i64;

/// Signed-in user as reported by the session check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id: UserId,
  pub first_name: String,
  pub last_name: Option<String>,
  pub username: Option<String>,
  pub avatar_url: Option<String>,
  pub is_admin: bool,
}

impl Identity {
  pub fn display_name(&self) -> String {
    match &self.last_name {
      Some(last) => format!("{} {}", self.first_name, last),
      None => self.first_name.clone(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
  #[default]
  Issue,
  Suggestion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
  #[default]
  Open,
  FixComing,
  Fixed,
  Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  /// By score, highest first
  #[default]
  Rate,
  /// Newest first
  Time,
}

/// A viewer's vote on a card. `None` is the toggled-off state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum VoteValue {
  Down,
  #[default]
  None,
  Up,
}

impl From<VoteValue> for i8 {
  fn from(value: VoteValue) -> Self {
    match value {
      VoteValue::Down => -1,
      VoteValue::None => 0,
      VoteValue::Up => 1,
    }
  }
}

impl TryFrom<i8> for VoteValue {
  type Error = String;

  fn try_from(value: i8) -> Result<Self, Self::Error> {
    match value {
      -1 => Ok(VoteValue::Down),
      0 => Ok(VoteValue::None),
      1 => Ok(VoteValue::Up),
      other => Err(format!("invalid vote value {}", other)),
    }
  }
}

macro_rules! wire_names {
  ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
    impl $ty {
      pub fn as_str(&self) -> &'static str {
        match self {
          $(Self::$variant => $name),+
        }
      }
    }

    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $ty {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
          $($name => Ok(Self::$variant),)+
          other => Err(format!("unknown value '{}'", other)),
        }
      }
    }
  };
}

wire_names!(CardType { Issue => "issue", Suggestion => "suggestion" });
wire_names!(CardStatus {
  Open => "open",
  FixComing => "fix_coming",
  Fixed => "fixed",
  Closed => "closed",
});
wire_names!(SortOrder { Rate => "rate", Time => "time" });

/// An issue or suggestion on the board
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
  pub id: CardId,
  pub title: String,
  pub description: String,
  pub card_type: CardType,
  pub status: CardStatus,
  /// Opaque attachment URLs
  pub attachments: Vec<String>,
  pub score: i64,
  pub up_count: i64,
  pub down_count: i64,
  pub created_at: DateTime<Utc>,
  pub author: Option<Identity>,
  pub comment_count: i64,
  /// Only meaningful while signed in
  pub viewer_vote: Option<VoteValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
  pub id: CommentId,
  pub card_id: CardId,
  pub content: String,
  pub attachments: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub author: Option<Identity>,
}

/// A card together with its comments, cached under one key
#[derive(Debug, Clone, PartialEq)]
pub struct CardDetail {
  pub card: Card,
  pub comments: Vec<Comment>,
}

/// One page of the card feed as returned by the server
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
  pub cards: Vec<Card>,
  pub total: u64,
  pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
  Image,
  Video,
  File,
}

/// Result of an upload; the URL is stored on cards and comments as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
  pub url: String,
  pub kind: AttachmentKind,
  pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
  pub title: String,
  pub description: String,
  pub card_type: CardType,
  pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewComment {
  pub content: String,
  pub attachments: Vec<String>,
}

/// Payload produced by the identity widget after the user confirms login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredential {
  pub id: UserId,
  pub first_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub photo_url: Option<String>,
  pub auth_date: i64,
  pub hash: String,
}

/// Public server settings needed before login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicConfig {
  pub bot_username: String,
}
