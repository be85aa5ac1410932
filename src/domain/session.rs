//! Authentication session slice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionAction {
  LoginRequest,
  LoginSuccess { user: User, token: String },
  LoginFailure(String),
  Logout,
}

impl SessionAction {
  pub fn kind(&self) -> &'static str {
    match self {
      SessionAction::LoginRequest => "login_request",
      SessionAction::LoginSuccess { .. } => "login_success",
      SessionAction::LoginFailure(_) => "login_failure",
      SessionAction::Logout => "logout",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
  user: Option<User>,
  token: Option<String>,
  signed_in_at: Option<DateTime<Utc>>,
  #[serde(skip)]
  loading: bool,
  #[serde(skip)]
  error: Option<String>,
}

impl SessionState {
  pub fn reduce(&mut self, action: SessionAction) -> bool {
    match action {
      SessionAction::LoginRequest => {
        if self.loading {
          return false;
        }
        self.loading = true;
        self.error = None;
      }
      SessionAction::LoginSuccess { user, token } => {
        self.user = Some(user);
        self.token = Some(token);
        self.signed_in_at = Some(Utc::now());
        self.loading = false;
        self.error = None;
      }
      SessionAction::LoginFailure(message) => {
        self.loading = false;
        self.error = Some(message);
      }
      SessionAction::Logout => {
        if self.user.is_none() && self.token.is_none() {
          return false;
        }
        *self = SessionState::default();
      }
    }
    true
  }

  pub fn is_logged_in(&self) -> bool {
    self.user.is_some() && self.token.is_some()
  }

  pub fn user(&self) -> Option<&User> {
    self.user.as_ref()
  }

  pub fn token(&self) -> Option<&str> {
    self.token.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Durable part: load state is dropped.
  pub fn to_persisted(&self) -> SessionState {
    SessionState {
      loading: false,
      error: None,
      ..self.clone()
    }
  }

  pub fn merge_persisted(&mut self, persisted: SessionState) {
    self.user = persisted.user;
    self.token = persisted.token;
    self.signed_in_at = persisted.signed_in_at;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ada() -> User {
    User {
      id: "u1".into(),
      name: "Ada".into(),
      email: "ada@example.com".into(),
    }
  }

  #[test]
  fn test_login_flow() {
    let mut session = SessionState::default();
    assert!(!session.is_logged_in());

    session.reduce(SessionAction::LoginRequest);
    assert!(session.is_loading());

    session.reduce(SessionAction::LoginSuccess {
      user: ada(),
      token: "t0k".into(),
    });
    assert!(session.is_logged_in());
    assert!(!session.is_loading());
    assert_eq!(session.token(), Some("t0k"));
  }

  #[test]
  fn test_login_failure_keeps_previous_user() {
    let mut session = SessionState::default();
    session.reduce(SessionAction::LoginSuccess {
      user: ada(),
      token: "t".into(),
    });
    session.reduce(SessionAction::LoginRequest);
    session.reduce(SessionAction::LoginFailure("bad password".into()));

    assert!(session.is_logged_in());
    assert_eq!(session.error(), Some("bad password"));
  }

  #[test]
  fn test_logout_clears_everything() {
    let mut session = SessionState::default();
    assert!(!session.reduce(SessionAction::Logout));

    session.reduce(SessionAction::LoginSuccess {
      user: ada(),
      token: "t".into(),
    });
    assert!(session.reduce(SessionAction::Logout));
    assert_eq!(session, SessionState::default());
  }
}
