//! Persisted, rehydratable application store.
//!
//! The store owns the root reducer state and mirrors whitelisted slices to
//! durable storage. It starts in [`RehydrationPhase::NotStarted`]; nothing
//! may read persisted state until [`PersistedStore::rehydrate`] has moved it
//! to [`RehydrationPhase::Ready`].

mod envelope;
mod guard;

pub use envelope::{ControlAction, PersistenceEnvelope};
pub use guard::{ActionKind, GuardVerdict, SerializableActionGuard, DEFAULT_IGNORED_TYPES};

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::KeyValueStore;

/// Root reducer combining every slice of application state.
pub trait Reducer: Default + Send + 'static {
  type Action: Serialize + ActionKind + fmt::Debug + Send;

  /// Names of every slice, persisted or not.
  fn slice_names() -> &'static [&'static str];

  /// Apply an action. Returns the name of the slice that changed, if any.
  fn reduce(&mut self, action: Self::Action) -> Option<&'static str>;

  /// Serialize the durable part of one slice. `None` for unknown names.
  fn dehydrate_slice(&self, name: &str) -> Option<serde_json::Result<Value>>;

  /// Merge persisted data into one slice. `None` for unknown names.
  fn rehydrate_slice(&mut self, name: &str, value: Value) -> Option<serde_json::Result<()>>;
}

/// Rehydration lifecycle gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehydrationPhase {
  NotStarted,
  Rehydrating,
  Ready,
}

impl RehydrationPhase {
  pub fn as_str(&self) -> &'static str {
    match self {
      RehydrationPhase::NotStarted => "not_started",
      RehydrationPhase::Rehydrating => "rehydrating",
      RehydrationPhase::Ready => "ready",
    }
  }
}

/// Persistence settings.
#[derive(Debug, Clone)]
pub struct PersistConfig {
  /// Storage key holding the envelope
  pub key: String,
  pub version: u32,
  /// Slices eligible for persistence
  pub whitelist: BTreeSet<String>,
}

impl PersistConfig {
  pub fn new<I, S>(key: impl Into<String>, version: u32, whitelist: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      key: key.into(),
      version,
      whitelist: whitelist.into_iter().map(Into::into).collect(),
    }
  }
}

struct Inner<R: Reducer> {
  state: Mutex<R>,
  storage: Arc<dyn KeyValueStore>,
  config: PersistConfig,
  guard: SerializableActionGuard,
  phase: watch::Sender<RehydrationPhase>,
  revision: watch::Sender<u64>,
}

/// Application store with whitelisted durable persistence.
///
/// Cloning is cheap; all clones share the same state.
pub struct PersistedStore<R: Reducer> {
  inner: Arc<Inner<R>>,
}

impl<R: Reducer> Clone for PersistedStore<R> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<R: Reducer> PersistedStore<R> {
  /// Build a store around `reducer`'s initial state.
  ///
  /// Fails if the whitelist names a slice the reducer does not have.
  pub fn configure(
    reducer: R,
    storage: Arc<dyn KeyValueStore>,
    config: PersistConfig,
  ) -> Result<Self> {
    Self::configure_with_guard(reducer, storage, config, SerializableActionGuard::default())
  }

  pub fn configure_with_guard(
    reducer: R,
    storage: Arc<dyn KeyValueStore>,
    config: PersistConfig,
    guard: SerializableActionGuard,
  ) -> Result<Self> {
    let known = R::slice_names();
    if let Some(unknown) = config
      .whitelist
      .iter()
      .find(|name| !known.contains(&name.as_str()))
    {
      return Err(Error::UnknownSlice(unknown.clone()));
    }

    let (phase, _) = watch::channel(RehydrationPhase::NotStarted);
    let (revision, _) = watch::channel(0);

    Ok(Self {
      inner: Arc::new(Inner {
        state: Mutex::new(reducer),
        storage,
        config,
        guard,
        phase,
        revision,
      }),
    })
  }

  pub fn phase(&self) -> RehydrationPhase {
    *self.inner.phase.borrow()
  }

  pub fn is_ready(&self) -> bool {
    self.phase() == RehydrationPhase::Ready
  }

  /// Resolve once rehydration has finished.
  pub async fn wait_ready(&self) {
    let mut rx = self.inner.phase.subscribe();
    // The sender lives as long as `self`, so this cannot fail
    let _ = rx.wait_for(|phase| *phase == RehydrationPhase::Ready).await;
  }

  /// Watch the rehydration phase.
  pub fn phase_watch(&self) -> watch::Receiver<RehydrationPhase> {
    self.inner.phase.subscribe()
  }

  /// Revision counter bumped on every state change.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.inner.revision.subscribe()
  }

  pub fn config(&self) -> &PersistConfig {
    &self.inner.config
  }

  /// Read state through `f`. Refused until rehydration is complete.
  pub fn select<T>(&self, f: impl FnOnce(&R) -> T) -> Result<T> {
    let phase = self.phase();
    if phase != RehydrationPhase::Ready {
      return Err(Error::NotReady(phase.as_str()));
    }
    let state = self.inner.state.lock().map_err(Error::poisoned)?;
    Ok(f(&state))
  }

  /// Apply an action. Returns `true` if any slice changed.
  ///
  /// Refused with [`Error::NotReady`] until rehydration finishes, since
  /// restored slices would replace anything applied earlier. A change to a
  /// whitelisted slice is written through to storage. Write failures are
  /// logged and dropped; the next successful write supersedes them.
  pub fn dispatch(&self, action: R::Action) -> Result<bool> {
    let phase = self.phase();
    if phase != RehydrationPhase::Ready {
      return Err(Error::NotReady(phase.as_str()));
    }
    self.inner.guard.inspect(&action);
    let action_type = action.action_type();

    let mut state = self.inner.state.lock().map_err(Error::poisoned)?;
    let Some(changed) = state.reduce(action) else {
      return Ok(false);
    };
    debug!(action = %action_type, slice = changed, "state changed");

    if self.inner.config.whitelist.contains(changed) {
      if let Err(e) = self.write_envelope(&state) {
        warn!(slice = changed, error = %e, "dropping persistence write");
      }
    }
    drop(state);

    self.inner.revision.send_modify(|rev| *rev += 1);
    Ok(true)
  }

  /// Restore whitelisted slices from storage and open the gate.
  ///
  /// Returns the names of the slices that were restored. A missing or
  /// unreadable envelope leaves the default state in place.
  pub fn rehydrate(&self) -> Vec<String> {
    if self.phase() != RehydrationPhase::NotStarted {
      warn!(phase = self.phase().as_str(), "rehydrate called twice; ignoring");
      return Vec::new();
    }
    self.set_phase(RehydrationPhase::Rehydrating);

    let restored = match self.read_envelope() {
      Ok(Some(envelope)) => self.apply_envelope(envelope),
      Ok(None) => {
        debug!(key = %self.inner.config.key, "no persisted state; starting from defaults");
        Vec::new()
      }
      Err(e) => {
        warn!(error = %e, "failed to read persisted state; starting from defaults");
        Vec::new()
      }
    };

    self.set_phase(RehydrationPhase::Ready);
    if !restored.is_empty() {
      self.inner.revision.send_modify(|rev| *rev += 1);
    }
    info!(slices = ?restored, "store ready");
    restored
  }

  /// Write the current whitelisted state immediately.
  pub fn flush(&self) -> Result<()> {
    self.inner.guard.inspect(&ControlAction::Flush);
    let phase = self.phase();
    if phase != RehydrationPhase::Ready {
      return Err(Error::NotReady(phase.as_str()));
    }
    let state = self.inner.state.lock().map_err(Error::poisoned)?;
    self.write_envelope(&state)
  }

  /// Remove the persisted envelope. In-memory state is untouched.
  pub fn purge(&self) -> Result<()> {
    self.inner.guard.inspect(&ControlAction::Purge);
    self.inner.storage.remove(&self.inner.config.key)?;
    info!(key = %self.inner.config.key, "persisted state purged");
    Ok(())
  }

  /// Serialize the whitelisted slices of the current state.
  pub fn dehydrate(&self) -> Result<String> {
    let state = self.inner.state.lock().map_err(Error::poisoned)?;
    self.envelope_for(&state)
  }

  fn set_phase(&self, phase: RehydrationPhase) {
    debug!(phase = phase.as_str(), "rehydration phase");
    self.inner.phase.send_replace(phase);
  }

  fn read_envelope(&self) -> Result<Option<PersistenceEnvelope>> {
    let Some(raw) = self.inner.storage.get(&self.inner.config.key)? else {
      return Ok(None);
    };
    let envelope: PersistenceEnvelope = serde_json::from_str(&raw)?;
    Ok(Some(envelope))
  }

  fn apply_envelope(&self, envelope: PersistenceEnvelope) -> Vec<String> {
    let config = &self.inner.config;
    if envelope.version != config.version {
      warn!(
        found = envelope.version,
        expected = config.version,
        "persisted state version mismatch; discarding"
      );
      return Vec::new();
    }

    let slices: Vec<String> = envelope
      .slice_names()
      .filter(|name| config.whitelist.contains(*name))
      .map(String::from)
      .collect();
    self.inner.guard.inspect(&ControlAction::Rehydrate {
      slices: slices.clone(),
    });

    let mut state = match self.inner.state.lock() {
      Ok(state) => state,
      Err(e) => {
        warn!(error = %e, "state lock poisoned during rehydration");
        return Vec::new();
      }
    };

    let mut restored = Vec::new();
    for (name, value) in envelope.state {
      if !config.whitelist.contains(&name) {
        debug!(slice = %name, "ignoring persisted data for non-whitelisted slice");
        continue;
      }
      match state.rehydrate_slice(&name, value) {
        Some(Ok(())) => restored.push(name),
        Some(Err(e)) => warn!(slice = %name, error = %e, "could not restore slice; using defaults"),
        None => debug!(slice = %name, "ignoring persisted data for unknown slice"),
      }
    }
    restored
  }

  fn envelope_for(&self, state: &R) -> Result<String> {
    let mut envelope = PersistenceEnvelope::new(self.inner.config.version);
    for name in &self.inner.config.whitelist {
      if let Some(value) = state.dehydrate_slice(name) {
        envelope.state.insert(name.clone(), value?);
      }
    }
    Ok(serde_json::to_string(&envelope)?)
  }

  fn write_envelope(&self, state: &R) -> Result<()> {
    let blob = self.envelope_for(state)?;
    self.inner.storage.set(&self.inner.config.key, &blob)
  }
}
