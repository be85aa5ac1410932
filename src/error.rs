//! Error taxonomy for the sync layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Remote fetch failed and no cached value could stand in for it.
  #[error("network error: {0}")]
  Network(String),

  /// Durable storage read or write failed.
  #[error("storage error: {0}")]
  Storage(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Persisted state was read before rehydration finished.
  #[error("store is not ready (phase: {0})")]
  NotReady(&'static str),

  #[error("unknown slice: {0}")]
  UnknownSlice(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("config error: {0}")]
  Config(String),
}

impl Error {
  pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
    Error::Storage(format!("{}: {}", context, err))
  }

  pub(crate) fn poisoned(err: impl std::fmt::Display) -> Self {
    Error::Storage(format!("Lock poisoned: {}", err))
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Error::Storage(err.to_string())
  }
}
