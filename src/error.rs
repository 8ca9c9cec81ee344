//! Error taxonomy for the board client core.

use thiserror::Error;

/// Errors surfaced by the client core.
///
/// Cloneable because a single in-flight request outcome is handed to every
/// reader that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
  /// Transport failure or non-2xx response
  #[error("network error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
  Network {
    status: Option<u16>,
    message: String,
  },

  /// Response body did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// Precondition unmet before any call was issued
  #[error("invalid input: {0}")]
  Validation(String),

  /// Mutation attempted without a signed-in identity
  #[error("login required")]
  AuthRequired,

  /// Admin-only mutation attempted by a regular identity
  #[error("admin access required")]
  AdminRequired,

  /// Durable session storage failed
  #[error("session storage error: {0}")]
  Storage(String),
}

impl BoardError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::Network {
      status: None,
      message: message.into(),
    }
  }

  pub fn http(status: u16, message: impl Into<String>) -> Self {
    Self::Network {
      status: Some(status),
      message: message.into(),
    }
  }

  /// HTTP status code, when the failure came from a server response.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Network { status, .. } => *status,
      _ => None,
    }
  }

  /// True for failures detected locally, before any network round-trip.
  pub fn is_precondition(&self) -> bool {
    matches!(
      self,
      Self::Validation(_) | Self::AuthRequired | Self::AdminRequired
    )
  }
}

impl From<reqwest::Error> for BoardError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      return Self::Decode(err.to_string());
    }
    Self::Network {
      status: err.status().map(|s| s.as_u16()),
      message: err.to_string(),
    }
  }
}

impl From<rusqlite::Error> for BoardError {
  fn from(err: rusqlite::Error) -> Self {
    Self::Storage(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_network_display_includes_status() {
    let err = BoardError::http(403, "Admin access required");
    assert_eq!(err.to_string(), "network error (403): Admin access required");
    assert_eq!(err.status(), Some(403));

    let err = BoardError::network("connection refused");
    assert_eq!(err.to_string(), "network error: connection refused");
    assert_eq!(err.status(), None);
  }

  #[test]
  fn test_precondition_classification() {
    assert!(BoardError::AuthRequired.is_precondition());
    assert!(BoardError::Validation("title".into()).is_precondition());
    assert!(!BoardError::network("down").is_precondition());
  }
}
