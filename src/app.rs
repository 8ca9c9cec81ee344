use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::board::cached_client::BoardClient;
use crate::board::client::{BoardApi, HttpBoardApi};
use crate::board::types::{Card, CardDetail, Comment, LoginCredential, NewCard, NewComment};
use crate::cache::QueryCache;
use crate::commands::Command;
use crate::config::Config;
use crate::error::BoardError;
use crate::feed::{FeedAssembler, FeedHandle};
use crate::filter::{Filter, FilterState};
use crate::mutations::MutationCoordinator;
use crate::session::{NoopStorage, SessionStorage, SessionStore, SqliteStorage};

/// The client core wired over one resource fetcher and one cache.
pub struct Board {
  pub client: BoardClient,
  pub filters: FilterState,
  pub feeds: FeedAssembler,
  pub session: SessionStore,
  pub mutations: MutationCoordinator,
}

impl Board {
  pub fn new(api: Arc<dyn BoardApi>, storage: Arc<dyn SessionStorage>, config: &Config) -> Self {
    let cache = QueryCache::new()
      .with_stale_time(config.stale_time())
      .with_gc_time(config.gc_time());
    let client = BoardClient::new(Arc::clone(&api), cache.clone());
    let session = SessionStore::new(Arc::clone(&api), storage);
    Self {
      feeds: FeedAssembler::new(client.clone(), config.page_sizes()),
      mutations: MutationCoordinator::new(api, cache, session.clone()),
      filters: FilterState::default(),
      client,
      session,
    }
  }

  /// A feed following the board's filter store.
  pub fn feed(&self) -> FeedHandle {
    self.feeds.follow(&self.filters)
  }
}

/// Command-line application
pub struct App {
  board: Board,
  http: Arc<HttpBoardApi>,
  storage: Arc<dyn SessionStorage>,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let storage = open_storage(config);
    let cookie = storage.load_cookie().unwrap_or_else(|err| {
      warn!(error = %err, "could not load saved session cookie");
      None
    });

    let http = Arc::new(
      HttpBoardApi::new(&config.api.base_url, config.timeout())
        .map_err(|e| eyre!("{}", e))?
        .with_session_cookie(cookie),
    );
    let board = Board::new(http.clone(), Arc::clone(&storage), config);
    info!(api = %config.api.base_url, "board client ready");

    Ok(Self {
      board,
      http,
      storage,
    })
  }

  pub fn board(&self) -> &Board {
    &self.board
  }

  /// Run one command, printing plain text to stdout.
  pub async fn run(&self, command: Command) -> Result<()> {
    self.board.session.start().await;
    let result = self.execute(command).await;

    if self.board.session.snapshot().is_login_prompt_open {
      match self.board.client.api().fetch_public_config().await {
        Ok(public) => println!(
          "Sign in with the @{} login widget, then run: bugboard login <widget-json-file>",
          public.bot_username
        ),
        Err(_) => println!("Sign in first: bugboard login <widget-json-file>"),
      }
    }
    result
  }

  async fn execute(&self, command: Command) -> Result<()> {
    let board = &self.board;
    match command {
      Command::Cards {
        sort,
        card_type,
        status,
        query,
        pages,
      } => {
        board.filters.set(
          Filter::default()
            .with_sort(sort)
            .with_type(card_type)
            .with_status(status)
            .with_query(query),
        );
        let feed = board.feed();
        for _ in 0..pages.max(1) {
          if !feed.load_more().await.map_err(report)? {
            break;
          }
        }
        for card in feed.items() {
          println!("{}", card_line(&card));
        }
        println!(
          "{} of {} cards{}",
          feed.len(),
          feed.total_count().unwrap_or(0),
          if feed.has_more() { ", more available" } else { "" }
        );
      }
      Command::Card { id } => {
        let detail = board
          .client
          .card_detail(id)
          .await
          .into_result()
          .map_err(report)?;
        print_detail(&detail);
      }
      Command::Login { credential } => {
        let contents = std::fs::read_to_string(&credential)
          .map_err(|e| eyre!("Failed to read {}: {}", credential.display(), e))?;
        let credential: LoginCredential = serde_json::from_str(&contents)
          .map_err(|e| eyre!("Invalid login payload {}: {}", credential.display(), e))?;
        if !board.session.login(&credential).await {
          return Err(eyre!("Login failed"));
        }
        self.save_cookie();
        if let Some(identity) = board.session.identity() {
          println!("Signed in as {}", identity.display_name());
        }
      }
      Command::Logout => {
        board.session.logout().await;
        self.save_cookie();
        println!("Signed out");
      }
      Command::Whoami => match board.session.identity() {
        Some(identity) => println!(
          "{} (id {}){}",
          identity.display_name(),
          identity.id,
          if identity.is_admin { ", admin" } else { "" }
        ),
        None => println!("Not signed in"),
      },
      Command::New {
        title,
        description,
        card_type,
        attachments,
      } => {
        let card = board
          .mutations
          .create_card(NewCard {
            title,
            description,
            card_type,
            attachments,
          })
          .await
          .map_err(report)?;
        println!("Created {}", card_line(&card));
      }
      Command::Vote { id, value } => {
        let card = match value.clicked() {
          Some(clicked) => {
            let detail = board
              .client
              .card_detail(id)
              .await
              .into_result()
              .map_err(report)?;
            board.mutations.vote(&detail.card, clicked).await
          }
          None => board.mutations.remove_vote(id).await,
        }
        .map_err(report)?;
        println!("{}", card_line(&card));
      }
      Command::Comment {
        id,
        text,
        attachments,
      } => {
        let comment = board
          .mutations
          .create_comment(
            id,
            NewComment {
              content: text,
              attachments,
            },
          )
          .await
          .map_err(report)?;
        println!("Commented: {}", comment_line(&comment));
      }
      Command::DeleteComment {
        card_id,
        comment_id,
      } => {
        board
          .mutations
          .delete_comment(card_id, comment_id)
          .await
          .map_err(report)?;
        println!("Deleted comment {}", comment_id);
      }
      Command::Delete { id } => {
        board
          .mutations
          .delete_card(id)
          .await
          .map_err(report)?;
        println!("Deleted card #{}", id);
      }
      Command::Status { id, status } => {
        let card = board
          .mutations
          .update_status(id, status)
          .await
          .map_err(report)?;
        println!("{}", card_line(&card));
      }
      Command::Upload { file } => {
        let bytes = std::fs::read(&file)
          .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
        let filename = file
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .ok_or_else(|| eyre!("Not a file: {}", file.display()))?;
        let attachment = board
          .mutations
          .upload_attachment(&filename, bytes)
          .await
          .map_err(report)?;
        println!("{}", attachment.url);
      }
    }
    Ok(())
  }

  fn save_cookie(&self) {
    let cookie = self.http.session_cookie();
    if let Err(err) = self.storage.save_cookie(cookie.as_deref()) {
      warn!(error = %err, "could not save session cookie");
    }
  }
}

fn open_storage(config: &Config) -> Arc<dyn SessionStorage> {
  let path = match config.session_path() {
    Ok(Some(path)) => path,
    Ok(None) => return Arc::new(NoopStorage),
    Err(err) => {
      warn!(error = %err, "session persistence unavailable");
      return Arc::new(NoopStorage);
    }
  };
  match SqliteStorage::open(&path) {
    Ok(storage) => Arc::new(storage),
    Err(err) => {
      warn!(error = %err, path = %path.display(), "session persistence unavailable");
      Arc::new(NoopStorage)
    }
  }
}

/// Local refusals read as they are; server and transport failures say so.
fn report(err: BoardError) -> color_eyre::Report {
  if err.is_precondition() {
    return eyre!("{}", err);
  }
  warn!(error = %err, "board request failed");
  eyre!("Board request failed: {}", err)
}

fn card_line(card: &Card) -> String {
  let vote = match card.viewer_vote.map(i8::from) {
    Some(1) => " (you: +1)",
    Some(-1) => " (you: -1)",
    _ => "",
  };
  format!(
    "#{:<5} {:+4} [{}/{}] {} ({} comments){}",
    card.id, card.score, card.card_type, card.status, card.title, card.comment_count, vote
  )
}

fn comment_line(comment: &Comment) -> String {
  let author = comment
    .author
    .as_ref()
    .map(|a| a.display_name())
    .unwrap_or_else(|| "anonymous".to_string());
  let mut line = format!("[{}] {}: {}", comment.id, author, comment.content);
  for url in &comment.attachments {
    line.push_str(&format!("\n    {}", url));
  }
  line
}

fn print_detail(detail: &CardDetail) {
  let card = &detail.card;
  println!("{}", card_line(card));
  println!(
    "up {} / down {}, opened {}",
    card.up_count,
    card.down_count,
    card.created_at.format("%Y-%m-%d %H:%M")
  );
  if !card.description.is_empty() {
    println!("\n{}\n", card.description);
  }
  for url in &card.attachments {
    println!("  attachment: {}", url);
  }
  for comment in &detail.comments {
    println!("  {}", comment_line(comment));
  }
}
