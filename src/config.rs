use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::PageSizes;

/// Largest page the server serves; anything above is clamped to its default.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub feed: FeedConfig,
  pub session: SessionConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the board API, e.g. "https://board.example.com/api/"
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080/api/".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  /// Seconds before a cached read is considered stale
  pub stale_secs: u64,
  /// Seconds an unread entry is kept before eviction
  pub gc_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: 60,
      gc_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
  /// Cards in the first, bulk page
  pub initial_page_size: u32,
  /// Cards in every page after the first
  pub page_size: u32,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      initial_page_size: 100,
      page_size: 20,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
  /// Remember the signed-in identity between runs
  pub persist: bool,
  /// Session database (defaults to <data_dir>/bugboard/session.db)
  pub path: Option<PathBuf>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bugboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bugboard/config.yaml
  ///
  /// Without a file the defaults apply. `BUGBOARD_API_URL` overrides the base URL.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var("BUGBOARD_API_URL") {
      if !url.trim().is_empty() {
        config.api.base_url = url;
      }
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("bugboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bugboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Check the page sizes map onto whole server pages.
  pub fn validate(&self) -> Result<()> {
    let FeedConfig {
      initial_page_size,
      page_size,
    } = self.feed;

    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
      return Err(eyre!(
        "feed.page_size must be between 1 and {}, got {}",
        MAX_PAGE_SIZE,
        page_size
      ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&initial_page_size) {
      return Err(eyre!(
        "feed.initial_page_size must be between 1 and {}, got {}",
        MAX_PAGE_SIZE,
        initial_page_size
      ));
    }
    if initial_page_size % page_size != 0 {
      return Err(eyre!(
        "feed.initial_page_size ({}) must be a multiple of feed.page_size ({})",
        initial_page_size,
        page_size
      ));
    }
    if self.api.base_url.trim().is_empty() {
      return Err(eyre!("api.base_url must not be empty"));
    }
    Ok(())
  }

  pub fn page_sizes(&self) -> PageSizes {
    PageSizes::new(self.feed.initial_page_size, self.feed.page_size)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn stale_time(&self) -> chrono::Duration {
    seconds(self.cache.stale_secs)
  }

  pub fn gc_time(&self) -> chrono::Duration {
    seconds(self.cache.gc_secs)
  }

  /// Where the session database lives, if persistence is on.
  pub fn session_path(&self) -> Result<Option<PathBuf>> {
    if !self.session.persist {
      return Ok(None);
    }
    match &self.session.path {
      Some(path) => Ok(Some(path.clone())),
      None => crate::session::storage::default_path()
        .map(Some)
        .map_err(|e| eyre!("{}", e)),
    }
  }
}

fn seconds(secs: u64) -> chrono::Duration {
  let secs = i64::try_from(secs).unwrap_or(i64::MAX);
  chrono::Duration::seconds(secs.min(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "http://localhost:8080/api/");
    assert_eq!(config.cache.stale_secs, 60);
    assert_eq!(config.gc_time(), chrono::Duration::minutes(5));
    assert_eq!(config.page_sizes(), PageSizes::new(100, 20));
    assert!(config.session.persist);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let config = Config::parse(
      "api:\n  base_url: https://board.example.com/api/\nfeed:\n  page_size: 25\n",
    )
    .unwrap();
    assert_eq!(config.api.base_url, "https://board.example.com/api/");
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.feed.page_size, 25);
    assert_eq!(config.feed.initial_page_size, 100);
  }

  #[test]
  fn test_empty_file_is_default() {
    assert_eq!(Config::parse("").unwrap(), Config::default());
  }

  #[test]
  fn test_page_size_validation() {
    let mut config = Config::default();
    config.feed.page_size = 30;
    assert!(config.validate().is_err());

    config.feed.page_size = 0;
    assert!(config.validate().is_err());

    config.feed.page_size = 50;
    config.feed.initial_page_size = 150;
    assert!(config.validate().is_err());

    config.feed.initial_page_size = 100;
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache:\n  stale_secs: 5\nsession:\n  persist: false").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.stale_time(), chrono::Duration::seconds(5));
    assert_eq!(config.session_path().unwrap(), None);
  }

  #[test]
  fn test_missing_explicit_path() {
    assert!(Config::load(Some(Path::new("/nonexistent/bugboard.yaml"))).is_err());
  }

  #[test]
  fn test_malformed_value_is_rejected() {
    assert!(Config::parse("feed:\n  page_size: lots\n").is_err());
  }
}
