//! Command-line commands.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use crate::board::types::{CardId, CardStatus, CardType, CommentId, SortOrder, VoteValue};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// List cards in the feed
  Cards {
    #[arg(long, default_value = "rate")]
    sort: SortOrder,
    /// Only cards of this type (issue, suggestion)
    #[arg(long = "type")]
    card_type: Option<CardType>,
    /// Only cards with this status (open, fix_coming, fixed, closed)
    #[arg(long)]
    status: Option<CardStatus>,
    /// Free-text search
    #[arg(long, default_value = "")]
    query: String,
    /// How many feed pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,
  },
  /// Show a card with its comments
  Card { id: CardId },
  /// Sign in with the JSON payload produced by the login widget
  Login { credential: PathBuf },
  /// Sign out
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Create a card
  New {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long = "type", default_value = "issue")]
    card_type: CardType,
    /// Attachment URL from `upload`
    #[arg(long = "attach")]
    attachments: Vec<String>,
  },
  /// Vote on a card; voting the active value again clears it
  Vote { id: CardId, value: VoteArg },
  /// Comment on a card
  Comment {
    id: CardId,
    #[arg(default_value = "")]
    text: String,
    #[arg(long = "attach")]
    attachments: Vec<String>,
  },
  /// Delete a comment (admin)
  DeleteComment {
    card_id: CardId,
    comment_id: CommentId,
  },
  /// Delete a card (admin)
  Delete { id: CardId },
  /// Change a card's status (admin)
  Status { id: CardId, status: CardStatus },
  /// Upload a file and print its attachment URL
  Upload { file: PathBuf },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteArg {
  Up,
  Down,
  Clear,
}

impl VoteArg {
  /// The vote to click; `None` for `clear`, which withdraws the vote directly.
  pub fn clicked(self) -> Option<VoteValue> {
    match self {
      VoteArg::Up => Some(VoteValue::Up),
      VoteArg::Down => Some(VoteValue::Down),
      VoteArg::Clear => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("bugboard").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_cards_filters() {
    match parse(&["cards", "--type", "suggestion", "--status", "fix_coming", "--pages", "3"]) {
      Command::Cards {
        sort,
        card_type,
        status,
        pages,
        ..
      } => {
        assert_eq!(sort, SortOrder::Rate);
        assert_eq!(card_type, Some(CardType::Suggestion));
        assert_eq!(status, Some(CardStatus::FixComing));
        assert_eq!(pages, 3);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_vote_values() {
    match parse(&["vote", "7", "clear"]) {
      Command::Vote { id, value } => {
        assert_eq!(id, 7);
        assert_eq!(value.clicked(), None);
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(VoteArg::Up.clicked(), Some(VoteValue::Up));
  }

  #[test]
  fn test_new_defaults_to_issue() {
    match parse(&["new", "--title", "Crash"]) {
      Command::New { card_type, .. } => assert_eq!(card_type, CardType::Issue),
      other => panic!("unexpected {:?}", other),
    }
  }
}
