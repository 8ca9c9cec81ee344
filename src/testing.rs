//! In-memory stand-in for the board server, used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::board::cache::PageRequest;
use crate::board::client::BoardApi;
use crate::board::types::{
  Attachment, AttachmentKind, Card, CardDetail, CardId, CardStatus, CardType, Comment, CommentId,
  FeedPage, Identity, LoginCredential, NewCard, NewComment, PublicConfig, VoteValue,
};
use crate::error::BoardError;
use crate::filter::Filter;

pub fn identity(id: i64, is_admin: bool) -> Identity {
  Identity {
    id,
    first_name: format!("User{}", id),
    last_name: None,
    username: None,
    avatar_url: None,
    is_admin,
  }
}

pub fn card(id: CardId, card_type: CardType) -> Card {
  Card {
    id,
    title: format!("Card {}", id),
    description: String::new(),
    card_type,
    status: CardStatus::Open,
    attachments: Vec::new(),
    score: 0,
    up_count: 0,
    down_count: 0,
    created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    author: None,
    comment_count: 0,
    viewer_vote: None,
  }
}

#[derive(Default)]
struct FakeState {
  cards: Vec<Card>,
  comments: Vec<Comment>,
  /// Identity the server reports for the session
  session: Option<Identity>,
  /// Identity that `login` signs in
  login_identity: Option<Identity>,
  calls: HashMap<&'static str, usize>,
  failing: HashSet<&'static str>,
  sent_votes: Vec<(CardId, VoteValue)>,
  next_id: i64,
}

/// Fake server with call counters, injectable failures and latency.
#[derive(Default)]
pub struct FakeBoardApi {
  state: Mutex<FakeState>,
  latency: Option<Duration>,
}

impl FakeBoardApi {
  pub fn with_cards(count: i64) -> Self {
    let cards = (1..=count)
      .map(|id| {
        let card_type = if id % 2 == 0 {
          CardType::Suggestion
        } else {
          CardType::Issue
        };
        card(id, card_type)
      })
      .collect();
    let fake = Self::default();
    {
      let mut state = fake.lock();
      state.cards = cards;
      state.next_id = 1000;
    }
    fake
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  fn lock(&self) -> MutexGuard<'_, FakeState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn calls(&self, name: &str) -> usize {
    self.lock().calls.get(name).copied().unwrap_or(0)
  }

  pub fn fail(&self, name: &'static str) {
    self.lock().failing.insert(name);
  }

  pub fn recover(&self, name: &'static str) {
    self.lock().failing.remove(name);
  }

  pub fn sent_votes(&self) -> Vec<(CardId, VoteValue)> {
    self.lock().sent_votes.clone()
  }

  pub fn set_session(&self, identity: Option<Identity>) {
    self.lock().session = identity;
  }

  pub fn set_login_identity(&self, identity: Option<Identity>) {
    self.lock().login_identity = identity;
  }

  pub fn add_comment(&self, card_id: CardId, content: &str) -> CommentId {
    let mut state = self.lock();
    state.next_id += 1;
    let id = state.next_id;
    state.comments.push(Comment {
      id,
      card_id,
      content: content.to_string(),
      attachments: Vec::new(),
      created_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
      author: None,
    });
    id
  }

  /// Count the call, then fail if the method was marked failing.
  async fn enter(&self, name: &'static str) -> Result<(), BoardError> {
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
    let mut state = self.lock();
    *state.calls.entry(name).or_default() += 1;
    if state.failing.contains(name) {
      return Err(BoardError::http(500, format!("{} failed", name)));
    }
    Ok(())
  }

  fn find_card(state: &FakeState, id: CardId) -> Result<Card, BoardError> {
    state
      .cards
      .iter()
      .find(|c| c.id == id)
      .cloned()
      .ok_or_else(|| BoardError::http(404, "Card not found"))
  }
}

#[async_trait]
impl BoardApi for FakeBoardApi {
  async fn fetch_feed(&self, filter: &Filter, page: PageRequest) -> Result<FeedPage, BoardError> {
    self.enter("fetch_feed").await?;
    let state = self.lock();
    let matching: Vec<Card> = state
      .cards
      .iter()
      .filter(|c| filter.card_type.map_or(true, |t| c.card_type == t))
      .filter(|c| filter.status.map_or(true, |s| c.status == s))
      .filter(|c| filter.query.is_empty() || c.title.contains(&filter.query))
      .cloned()
      .collect();

    let total = matching.len() as u64;
    let start = (page.offset as usize).min(matching.len());
    let end = (start + page.size as usize).min(matching.len());
    Ok(FeedPage {
      cards: matching[start..end].to_vec(),
      total,
      has_more: (end as u64) < total,
    })
  }

  async fn fetch_card_detail(&self, id: CardId) -> Result<CardDetail, BoardError> {
    self.enter("fetch_card_detail").await?;
    let state = self.lock();
    let card = Self::find_card(&state, id)?;
    let comments = state
      .comments
      .iter()
      .filter(|c| c.card_id == id)
      .cloned()
      .collect();
    Ok(CardDetail { card, comments })
  }

  async fn create_card(&self, input: &NewCard) -> Result<Card, BoardError> {
    self.enter("create_card").await?;
    let mut state = self.lock();
    state.next_id += 1;
    let mut created = card(state.next_id, input.card_type);
    created.title = input.title.clone();
    created.description = input.description.clone();
    created.attachments = input.attachments.clone();
    state.cards.insert(0, created.clone());
    Ok(created)
  }

  async fn delete_card(&self, id: CardId) -> Result<(), BoardError> {
    self.enter("delete_card").await?;
    self.lock().cards.retain(|c| c.id != id);
    Ok(())
  }

  async fn update_card_status(&self, id: CardId, status: CardStatus) -> Result<Card, BoardError> {
    self.enter("update_card_status").await?;
    let mut state = self.lock();
    let card = state
      .cards
      .iter_mut()
      .find(|c| c.id == id)
      .ok_or_else(|| BoardError::http(404, "Card not found"))?;
    card.status = status;
    Ok(card.clone())
  }

  async fn vote(&self, card_id: CardId, value: VoteValue) -> Result<Card, BoardError> {
    self.enter("vote").await?;
    let mut state = self.lock();
    state.sent_votes.push((card_id, value));
    let card = state
      .cards
      .iter_mut()
      .find(|c| c.id == card_id)
      .ok_or_else(|| BoardError::http(404, "Card not found"))?;
    card.viewer_vote = Some(value);
    card.up_count = i64::from(value == VoteValue::Up);
    card.down_count = i64::from(value == VoteValue::Down);
    card.score = card.up_count - card.down_count;
    Ok(card.clone())
  }

  async fn create_comment(
    &self,
    card_id: CardId,
    input: &NewComment,
  ) -> Result<Comment, BoardError> {
    self.enter("create_comment").await?;
    let id = self.add_comment(card_id, &input.content);
    let state = self.lock();
    state
      .comments
      .iter()
      .find(|c| c.id == id)
      .cloned()
      .ok_or_else(|| BoardError::http(500, "Error creating comment"))
  }

  async fn delete_comment(&self, id: CommentId) -> Result<(), BoardError> {
    self.enter("delete_comment").await?;
    self.lock().comments.retain(|c| c.id != id);
    Ok(())
  }

  async fn check_session(&self) -> Result<Option<Identity>, BoardError> {
    self.enter("check_session").await?;
    Ok(self.lock().session.clone())
  }

  async fn login(&self, _credential: &LoginCredential) -> Result<bool, BoardError> {
    self.enter("login").await?;
    let mut state = self.lock();
    match state.login_identity.clone() {
      Some(identity) => {
        state.session = Some(identity);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn logout(&self) -> Result<(), BoardError> {
    self.enter("logout").await?;
    self.lock().session = None;
    Ok(())
  }

  async fn upload_attachment(
    &self,
    filename: &str,
    _bytes: Vec<u8>,
  ) -> Result<Attachment, BoardError> {
    self.enter("upload_attachment").await?;
    Ok(Attachment {
      url: format!("https://cdn.example/{}", filename),
      kind: AttachmentKind::File,
      filename: filename.to_string(),
    })
  }

  async fn fetch_public_config(&self) -> Result<PublicConfig, BoardError> {
    self.enter("fetch_public_config").await?;
    Ok(PublicConfig {
      bot_username: "board_bot".to_string(),
    })
  }
}

pub fn credential() -> LoginCredential {
  LoginCredential {
    id: 5,
    first_name: "User5".to_string(),
    last_name: None,
    username: None,
    photo_url: None,
    auth_date: 1_700_000_000,
    hash: "abc".to_string(),
  }
}
