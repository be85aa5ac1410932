use std::collections::BTreeMap;
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// In-memory storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored keys.
  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self.entries.lock().map_err(Error::poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self.entries.lock().map_err(Error::poisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self.entries.lock().map_err(Error::poisoned)?;
    entries.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let entries = self.entries.lock().map_err(Error::poisoned)?;
    Ok(
      entries
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect(),
    )
  }
}
