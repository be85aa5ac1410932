//! Durable key-value storage boundary.
//!
//! Every value passing through here is a pre-serialized string. Writes are
//! full-value replaces keyed by a unique key, so last-write-wins needs no
//! locking beyond the backend's own.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// Trait for durable storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// List keys starting with `prefix`.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
