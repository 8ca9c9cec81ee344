use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::board::api_types::{
  ApiAttachment, ApiCard, ApiCardDetailResponse, ApiCardsResponse, ApiComment, ApiConfig,
  ApiCreateCard, ApiCreateComment, ApiErrorBody, ApiOk, ApiStatusUpdate, ApiUser, ApiVote,
};
use crate::board::cache::PageRequest;
use crate::board::types::{
  Attachment, Card, CardDetail, CardId, CardStatus, Comment, CommentId, FeedPage, Identity,
  LoginCredential, NewCard, NewComment, PublicConfig, VoteValue,
};
use crate::error::BoardError;
use crate::filter::Filter;

const SESSION_COOKIE: &str = "session_id";

/// The only way the core touches the network.
///
/// Implementations translate one resource call into a request and decode the
/// response; they hold no cache state.
#[async_trait]
pub trait BoardApi: Send + Sync {
  async fn fetch_feed(&self, filter: &Filter, page: PageRequest) -> Result<FeedPage, BoardError>;

  async fn fetch_card_detail(&self, id: CardId) -> Result<CardDetail, BoardError>;

  async fn create_card(&self, input: &NewCard) -> Result<Card, BoardError>;

  async fn delete_card(&self, id: CardId) -> Result<(), BoardError>;

  async fn update_card_status(&self, id: CardId, status: CardStatus) -> Result<Card, BoardError>;

  async fn vote(&self, card_id: CardId, value: VoteValue) -> Result<Card, BoardError>;

  async fn create_comment(&self, card_id: CardId, input: &NewComment)
    -> Result<Comment, BoardError>;

  async fn delete_comment(&self, id: CommentId) -> Result<(), BoardError>;

  /// `Ok(None)` when nobody is signed in.
  async fn check_session(&self) -> Result<Option<Identity>, BoardError>;

  async fn login(&self, credential: &LoginCredential) -> Result<bool, BoardError>;

  async fn logout(&self) -> Result<(), BoardError>;

  async fn upload_attachment(&self, filename: &str, bytes: Vec<u8>)
    -> Result<Attachment, BoardError>;

  async fn fetch_public_config(&self) -> Result<PublicConfig, BoardError>;
}

/// Board API client over JSON/HTTPS
pub struct HttpBoardApi {
  http: reqwest::Client,
  base: Url,
  /// `session_id=<value>` as set by the server on login
  session_cookie: Mutex<Option<String>>,
}

impl HttpBoardApi {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BoardError> {
    // Url::join drops the last segment unless the base ends with '/'
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base = Url::parse(&normalized)
      .map_err(|e| BoardError::Validation(format!("invalid API URL {}: {}", base_url, e)))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .gzip(true)
      .build()
      .map_err(|e| BoardError::network(format!("failed to create HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base,
      session_cookie: Mutex::new(None),
    })
  }

  /// Resume a session whose cookie was saved by an earlier run.
  pub fn with_session_cookie(self, cookie: Option<String>) -> Self {
    self.set_session_cookie(cookie);
    self
  }

  pub fn session_cookie(&self) -> Option<String> {
    self
      .session_cookie
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn set_session_cookie(&self, cookie: Option<String>) {
    *self
      .session_cookie
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = cookie;
  }

  fn endpoint(&self, path: &str) -> Result<Url, BoardError> {
    self
      .base
      .join(path)
      .map_err(|e| BoardError::Validation(format!("invalid endpoint {}: {}", path, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.http.request(method, url);
    match self.session_cookie() {
      Some(cookie) => builder.header(COOKIE, cookie),
      None => builder,
    }
  }

  /// Send and fail on non-2xx, decoding the server's error message when present.
  async fn send_raw(&self, builder: RequestBuilder) -> Result<Response, BoardError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
      .map(|b| b.error)
      .unwrap_or_else(|_| format!("HTTP error! status: {}", status.as_u16()));
    debug!(status = status.as_u16(), %message, "request failed");
    Err(BoardError::http(status.as_u16(), message))
  }

  async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BoardError> {
    let response = self.send_raw(builder).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| BoardError::Decode(e.to_string()))
  }
}

/// Server page for a logical page; callers keep `offset` a multiple of `size`.
pub(crate) fn server_page(page: &PageRequest) -> u64 {
  page.offset / u64::from(page.size.max(1)) + 1
}

/// Pull `session_id=<value>` out of the response's Set-Cookie headers.
pub(crate) fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
  headers
    .get_all(SET_COOKIE)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .filter_map(|value| value.split(';').next())
    .map(str::trim)
    .find(|pair| {
      pair
        .strip_prefix(SESSION_COOKIE)
        .and_then(|rest| rest.strip_prefix('='))
        .is_some_and(|value| !value.is_empty())
    })
    .map(String::from)
}

#[async_trait]
impl BoardApi for HttpBoardApi {
  async fn fetch_feed(&self, filter: &Filter, page: PageRequest) -> Result<FeedPage, BoardError> {
    let mut url = self.endpoint("cards")?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("sort", filter.sort.as_str());
      if let Some(card_type) = filter.card_type {
        query.append_pair("type", card_type.as_str());
      }
      if let Some(status) = filter.status {
        query.append_pair("status", status.as_str());
      }
      query.append_pair("page", &server_page(&page).to_string());
      query.append_pair("limit", &page.size.to_string());
      let text = filter.query.trim();
      if !text.is_empty() {
        query.append_pair("query", text);
      }
    }

    let response: ApiCardsResponse = self.send(self.request(Method::GET, url)).await?;
    response.into_domain()
  }

  async fn fetch_card_detail(&self, id: CardId) -> Result<CardDetail, BoardError> {
    let url = self.endpoint(&format!("cards/{}", id))?;
    let response: ApiCardDetailResponse = self.send(self.request(Method::GET, url)).await?;
    response.into_domain()
  }

  async fn create_card(&self, input: &NewCard) -> Result<Card, BoardError> {
    let url = self.endpoint("cards")?;
    let body = ApiCreateCard {
      title: &input.title,
      description: &input.description,
      card_type: input.card_type,
      images: &input.attachments,
    };
    let card: ApiCard = self
      .send(self.request(Method::POST, url).json(&body))
      .await?;
    card.into_domain()
  }

  async fn delete_card(&self, id: CardId) -> Result<(), BoardError> {
    let url = self.endpoint(&format!("cards/{}", id))?;
    self.send_raw(self.request(Method::DELETE, url)).await?;
    Ok(())
  }

  async fn update_card_status(&self, id: CardId, status: CardStatus) -> Result<Card, BoardError> {
    let url = self.endpoint(&format!("cards/{}/status", id))?;
    let card: ApiCard = self
      .send(
        self
          .request(Method::PATCH, url)
          .json(&ApiStatusUpdate { status }),
      )
      .await?;
    card.into_domain()
  }

  async fn vote(&self, card_id: CardId, value: VoteValue) -> Result<Card, BoardError> {
    let url = self.endpoint(&format!("cards/{}/vote", card_id))?;
    let card: ApiCard = self
      .send(self.request(Method::POST, url).json(&ApiVote { value }))
      .await?;
    card.into_domain()
  }

  async fn create_comment(
    &self,
    card_id: CardId,
    input: &NewComment,
  ) -> Result<Comment, BoardError> {
    let url = self.endpoint(&format!("cards/{}/comments", card_id))?;
    let body = ApiCreateComment {
      content: &input.content,
      images: &input.attachments,
    };
    let comment: ApiComment = self
      .send(self.request(Method::POST, url).json(&body))
      .await?;
    Ok(comment.into())
  }

  async fn delete_comment(&self, id: CommentId) -> Result<(), BoardError> {
    let url = self.endpoint(&format!("comments/{}", id))?;
    self.send_raw(self.request(Method::DELETE, url)).await?;
    Ok(())
  }

  async fn check_session(&self) -> Result<Option<Identity>, BoardError> {
    let url = self.endpoint("auth/me")?;
    match self.send::<ApiUser>(self.request(Method::GET, url)).await {
      Ok(user) => Ok(Some(user.into())),
      Err(err) if err.status() == Some(StatusCode::UNAUTHORIZED.as_u16()) => Ok(None),
      Err(err) => Err(err),
    }
  }

  async fn login(&self, credential: &LoginCredential) -> Result<bool, BoardError> {
    let url = self.endpoint("auth/telegram")?;
    let response = self
      .send_raw(self.request(Method::POST, url).json(credential))
      .await?;

    match extract_session_cookie(response.headers()) {
      Some(cookie) => self.set_session_cookie(Some(cookie)),
      None => warn!("login response carried no session cookie"),
    }

    let body: ApiOk = response
      .json()
      .await
      .map_err(|e| BoardError::Decode(e.to_string()))?;
    Ok(body.ok)
  }

  async fn logout(&self) -> Result<(), BoardError> {
    let url = self.endpoint("auth/logout")?;
    let result = self.send_raw(self.request(Method::POST, url)).await;
    // The local session ends whatever the server said
    self.set_session_cookie(None);
    result.map(|_| ())
  }

  async fn upload_attachment(
    &self,
    filename: &str,
    bytes: Vec<u8>,
  ) -> Result<Attachment, BoardError> {
    let url = self.endpoint("upload")?;
    let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
    let attachment: ApiAttachment = self
      .send(self.request(Method::POST, url).multipart(form))
      .await?;
    Ok(attachment.into())
  }

  async fn fetch_public_config(&self) -> Result<PublicConfig, BoardError> {
    let url = self.endpoint("config")?;
    let config: ApiConfig = self.send(self.request(Method::GET, url)).await?;
    Ok(config.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::HeaderValue;

  #[test]
  fn test_server_page_mapping() {
    let first = PageRequest {
      number: 1,
      size: 100,
      offset: 0,
    };
    assert_eq!(server_page(&first), 1);

    // After a 100-item first page, 20-item pages start at server page 6
    let second = PageRequest {
      number: 2,
      size: 20,
      offset: 100,
    };
    assert_eq!(server_page(&second), 6);

    let third = PageRequest {
      number: 3,
      size: 20,
      offset: 120,
    };
    assert_eq!(server_page(&third), 7);
  }

  #[test]
  fn test_extract_session_cookie() {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark; Path=/"));
    headers.append(
      SET_COOKIE,
      HeaderValue::from_static("session_id=42; Path=/; Max-Age=2592000; HttpOnly"),
    );
    assert_eq!(
      extract_session_cookie(&headers),
      Some("session_id=42".to_string())
    );
  }

  #[test]
  fn test_cleared_cookie_is_ignored() {
    let mut headers = HeaderMap::new();
    headers.append(
      SET_COOKIE,
      HeaderValue::from_static("session_id=; Path=/; Max-Age=0"),
    );
    assert_eq!(extract_session_cookie(&headers), None);
  }

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let api = HttpBoardApi::new("http://localhost:8080/api", Duration::from_secs(5)).unwrap();
    assert_eq!(
      api.endpoint("cards/3").unwrap().as_str(),
      "http://localhost:8080/api/cards/3"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      HttpBoardApi::new("not a url", Duration::from_secs(5)),
      Err(BoardError::Validation(_))
    ));
  }

  #[test]
  fn test_session_cookie_roundtrip() {
    let api = HttpBoardApi::new("http://localhost:8080/api/", Duration::from_secs(5))
      .unwrap()
      .with_session_cookie(Some("session_id=7".into()));
    assert_eq!(api.session_cookie().as_deref(), Some("session_id=7"));
  }
}
