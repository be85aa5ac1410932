//! Versioned persistence envelope and the control actions around it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::guard::ActionKind;

/// Durable snapshot of the whitelisted slices.
///
/// Wire format: `{"version": 1, "state": {"notes": {...}, ...}}`. Unknown
/// top-level keys are ignored on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceEnvelope {
  pub version: u32,
  #[serde(default)]
  pub state: BTreeMap<String, Value>,
}

impl PersistenceEnvelope {
  pub fn new(version: u32) -> Self {
    Self {
      version,
      state: BTreeMap::new(),
    }
  }

  pub fn slice_names(&self) -> impl Iterator<Item = &str> {
    self.state.keys().map(String::as_str)
  }
}

/// Store-level actions that bypass the serializability guard.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlAction {
  Rehydrate { slices: Vec<String> },
  Purge,
  Flush,
}

impl ActionKind for ControlAction {
  fn namespace(&self) -> &'static str {
    "persist"
  }

  fn kind(&self) -> &'static str {
    match self {
      ControlAction::Rehydrate { .. } => "rehydrate",
      ControlAction::Purge => "purge",
      ControlAction::Flush => "flush",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_keys_are_ignored() {
    let raw = r#"{"version":2,"state":{"notes":{"items":[]}},"written_by":"newer-build"}"#;
    let envelope: PersistenceEnvelope = serde_json::from_str(raw).unwrap();
    assert_eq!(envelope.version, 2);
    assert_eq!(envelope.slice_names().collect::<Vec<_>>(), vec!["notes"]);
  }

  #[test]
  fn test_missing_state_defaults_empty() {
    let envelope: PersistenceEnvelope = serde_json::from_str(r#"{"version":1}"#).unwrap();
    assert!(envelope.state.is_empty());
  }
}
