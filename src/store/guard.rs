//! Serializability check applied to every dispatched action.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Identifies an action for logging and for the guard's allow-list.
pub trait ActionKind {
  /// Namespace of the action, usually the slice it targets.
  fn namespace(&self) -> &'static str;

  fn kind(&self) -> &'static str;

  /// Full action type, e.g. `notes/create`.
  fn action_type(&self) -> String {
    format!("{}/{}", self.namespace(), self.kind())
  }
}

/// Outcome of inspecting one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
  /// Guard disabled or action type allow-listed.
  Skipped,
  Passed,
  /// Payload could not be serialized. The action is still applied.
  Violation(String),
}

/// Lint-style check that action payloads are plain data.
///
/// Violations are reported through `warn!` and never block the action.
#[derive(Debug, Clone)]
pub struct SerializableActionGuard {
  enabled: bool,
  ignored_types: BTreeSet<String>,
}

/// Control actions that carry whole snapshots and are never inspected.
pub const DEFAULT_IGNORED_TYPES: &[&str] = &["persist/rehydrate", "persist/purge", "persist/flush"];

impl Default for SerializableActionGuard {
  fn default() -> Self {
    Self {
      enabled: cfg!(debug_assertions),
      ignored_types: DEFAULT_IGNORED_TYPES.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl SerializableActionGuard {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      ..Self::default()
    }
  }

  /// Add an action type to the allow-list.
  pub fn ignore(mut self, action_type: impl Into<String>) -> Self {
    self.ignored_types.insert(action_type.into());
    self
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn inspect<A>(&self, action: &A) -> GuardVerdict
  where
    A: Serialize + ActionKind,
  {
    if !self.enabled {
      return GuardVerdict::Skipped;
    }

    let action_type = action.action_type();
    if self.ignored_types.contains(&action_type) {
      return GuardVerdict::Skipped;
    }

    match serde_json::to_value(action) {
      Ok(_) => GuardVerdict::Passed,
      Err(e) => {
        warn!(
          action = %action_type,
          error = %e,
          "non-serializable value detected in action payload"
        );
        GuardVerdict::Violation(e.to_string())
      }
    }
  }
}
