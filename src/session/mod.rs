//! Session store: who is signed in, and whether we know yet.
//!
//! ```text
//! Unknown ──start──▶ Checking ──identity──▶ Authenticated
//!                       │ ▲                      │
//!          none / error │ └────── check ─────────┤
//!                       ▼                        │
//!                   Anonymous ◀──── logout ──────┘
//! ```
//!
//! Nothing here returns an error to the caller: a failed check means
//! "anonymous" and a failed login reports `false`.

pub mod storage;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::board::client::BoardApi;
use crate::board::types::{Identity, LoginCredential};

pub use storage::{NoopStorage, SessionStorage, SqliteStorage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
  /// Not checked yet
  Unknown,
  /// Session check in flight
  Checking,
  Authenticated(Identity),
  Anonymous,
}

/// Snapshot handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub identity: Option<Identity>,
  pub is_loading: bool,
  pub is_login_prompt_open: bool,
}

struct SessionInner {
  state: SessionState,
  /// Rehydrated from storage until the first check settles
  identity: Option<Identity>,
  is_loading: bool,
  is_login_prompt_open: bool,
}

/// Owner of the session identity. Clones share the same session.
#[derive(Clone)]
pub struct SessionStore {
  api: Arc<dyn BoardApi>,
  storage: Arc<dyn SessionStorage>,
  inner: Arc<Mutex<SessionInner>>,
}

impl SessionStore {
  /// Create the store, loading any identity saved by an earlier run.
  pub fn new(api: Arc<dyn BoardApi>, storage: Arc<dyn SessionStorage>) -> Self {
    let identity = storage.load_identity().unwrap_or_else(|err| {
      warn!(error = %err, "could not load saved identity");
      None
    });

    Self {
      api,
      storage,
      inner: Arc::new(Mutex::new(SessionInner {
        state: SessionState::Unknown,
        identity,
        is_loading: true,
        is_login_prompt_open: false,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, SessionInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn state(&self) -> SessionState {
    self.lock().state.clone()
  }

  pub fn snapshot(&self) -> Session {
    let inner = self.lock();
    Session {
      identity: inner.identity.clone(),
      is_loading: inner.is_loading,
      is_login_prompt_open: inner.is_login_prompt_open,
    }
  }

  /// Current identity. Before the first check settles this is the saved one.
  pub fn identity(&self) -> Option<Identity> {
    self.lock().identity.clone()
  }

  pub fn is_admin(&self) -> bool {
    self.lock().identity.as_ref().is_some_and(|i| i.is_admin)
  }

  pub fn open_login_prompt(&self) {
    self.lock().is_login_prompt_open = true;
  }

  pub fn close_login_prompt(&self) {
    self.lock().is_login_prompt_open = false;
  }

  /// Run the initial session check if it has not happened yet.
  pub async fn start(&self) -> Option<Identity> {
    let started = self.lock().state != SessionState::Unknown;
    if started {
      return self.identity();
    }
    self.check().await
  }

  /// Ask the server who is signed in. Can be repeated at any time.
  pub async fn check(&self) -> Option<Identity> {
    {
      let mut inner = self.lock();
      inner.state = SessionState::Checking;
      inner.is_loading = true;
    }

    let identity = match self.api.check_session().await {
      Ok(identity) => identity,
      Err(err) => {
        warn!(error = %err, "session check failed, continuing anonymously");
        None
      }
    };

    self.settle(identity.clone());
    identity
  }

  /// Sign in with a credential from the identity widget.
  ///
  /// On success the session is re-checked and the login prompt closes.
  /// Returns `false` and leaves the state as it was when the server rejects
  /// the credential or cannot be reached.
  pub async fn login(&self, credential: &LoginCredential) -> bool {
    match self.api.login(credential).await {
      Ok(true) => {}
      Ok(false) => {
        warn!(user = credential.id, "login rejected");
        return false;
      }
      Err(err) => {
        warn!(user = credential.id, error = %err, "login failed");
        return false;
      }
    }

    match self.api.check_session().await {
      Ok(Some(identity)) => {
        self.settle(Some(identity));
        self.close_login_prompt();
        true
      }
      Ok(None) => {
        warn!("server accepted login but reports no session");
        self.settle(None);
        false
      }
      Err(err) => {
        warn!(error = %err, "session check after login failed");
        false
      }
    }
  }

  /// Sign out. Local state clears whatever the server answers.
  pub async fn logout(&self) {
    if let Err(err) = self.api.logout().await {
      warn!(error = %err, "logout request failed, clearing session locally");
    }
    self.settle(None);
  }

  /// Apply the outcome of a check and persist the identity if it changed.
  fn settle(&self, identity: Option<Identity>) {
    let changed = {
      let mut inner = self.lock();
      inner.is_loading = false;
      inner.state = match &identity {
        Some(identity) => SessionState::Authenticated(identity.clone()),
        None => SessionState::Anonymous,
      };
      let changed = inner.identity != identity;
      inner.identity = identity.clone();
      changed
    };

    match &identity {
      Some(identity) => info!(user = identity.id, admin = identity.is_admin, "authenticated"),
      None => info!("anonymous"),
    }

    if changed {
      if let Err(err) = self.storage.save_identity(identity.as_ref()) {
        warn!(error = %err, "could not save identity");
      }
    }
  }
}

impl std::fmt::Debug for SessionStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionStore")
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
