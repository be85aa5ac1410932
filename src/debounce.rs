//! Trailing-edge debounce for effects triggered by continuous input.
//!
//! Each `(owner, key)` pair has at most one pending timer. Scheduling again
//! before it fires cancels the old timer and restarts the delay. Effects for
//! the same pair are totally ordered; effects for different pairs are not.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies the screen or controller that owns a set of timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
  pub fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    OwnerId(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

impl std::fmt::Display for OwnerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "owner-{}", self.0)
  }
}

type TimerKey = (OwnerId, String);

struct Pending {
  generation: u64,
  handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
  pending: HashMap<TimerKey, Pending>,
  next_generation: u64,
}

/// Shared debounce scheduler. Cloning shares the timer table.
#[derive(Clone, Default)]
pub struct DebouncedPipeline {
  timers: Arc<Mutex<Timers>>,
}

fn lock(timers: &Mutex<Timers>) -> MutexGuard<'_, Timers> {
  // The table is never left half-updated, so a poisoned lock is still usable
  timers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DebouncedPipeline {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `effect` once `delay` has passed without another `schedule` for the
  /// same `(owner, key)`.
  ///
  /// An effect that has already started is never cancelled by later calls.
  /// Must be called from within a tokio runtime.
  pub fn schedule<Fut>(&self, owner: OwnerId, key: &str, delay: Duration, effect: Fut)
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    let timer_key: TimerKey = (owner, key.to_string());
    let mut timers = lock(&self.timers);
    let generation = timers.next_generation;
    timers.next_generation += 1;

    let table = Arc::clone(&self.timers);
    let fire_key = timer_key.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      {
        let mut timers = lock(&table);
        let current = timers
          .pending
          .get(&fire_key)
          .is_some_and(|p| p.generation == generation);
        if !current {
          // Superseded or cancelled after the sleep finished
          return;
        }
        timers.pending.remove(&fire_key);
      }
      trace!(owner = %fire_key.0, key = %fire_key.1, "debounced effect firing");
      effect.await;
    });

    if let Some(previous) = timers.pending.insert(timer_key, Pending { generation, handle }) {
      previous.handle.abort();
    }
  }

  /// Cancel the pending timer for `(owner, key)`. Returns whether one existed.
  pub fn cancel(&self, owner: OwnerId, key: &str) -> bool {
    let mut timers = lock(&self.timers);
    match timers.pending.remove(&(owner, key.to_string())) {
      Some(pending) => {
        pending.handle.abort();
        true
      }
      None => false,
    }
  }

  /// Cancel every pending timer of `owner`. Returns how many were cancelled.
  pub fn cancel_all(&self, owner: OwnerId) -> usize {
    let mut timers = lock(&self.timers);
    let keys: Vec<TimerKey> = timers
      .pending
      .keys()
      .filter(|(o, _)| *o == owner)
      .cloned()
      .collect();

    for key in &keys {
      if let Some(pending) = timers.pending.remove(key) {
        pending.handle.abort();
      }
    }
    if !keys.is_empty() {
      trace!(owner = %owner, count = keys.len(), "cancelled pending effects");
    }
    keys.len()
  }

  pub fn is_pending(&self, owner: OwnerId, key: &str) -> bool {
    lock(&self.timers)
      .pending
      .contains_key(&(owner, key.to_string()))
  }

  /// Total number of pending timers across all owners.
  pub fn pending_count(&self) -> usize {
    lock(&self.timers).pending.len()
  }

  /// A handle bound to a fresh owner that cancels its timers when dropped.
  pub fn scoped(&self) -> ScopedDebouncer {
    ScopedDebouncer {
      pipeline: self.clone(),
      owner: OwnerId::next(),
    }
  }
}

/// Owner-bound view of a [`DebouncedPipeline`].
///
/// Dropping it cancels every timer it scheduled, so effects never fire
/// against torn-down state.
pub struct ScopedDebouncer {
  pipeline: DebouncedPipeline,
  owner: OwnerId,
}

impl ScopedDebouncer {
  pub fn owner(&self) -> OwnerId {
    self.owner
  }

  pub fn schedule<Fut>(&self, key: &str, delay: Duration, effect: Fut)
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.pipeline.schedule(self.owner, key, delay, effect);
  }

  pub fn cancel(&self, key: &str) -> bool {
    self.pipeline.cancel(self.owner, key)
  }

  pub fn cancel_all(&self) -> usize {
    self.pipeline.cancel_all(self.owner)
  }

  pub fn is_pending(&self, key: &str) -> bool {
    self.pipeline.is_pending(self.owner, key)
  }
}

impl Drop for ScopedDebouncer {
  fn drop(&mut self) {
    self.pipeline.cancel_all(self.owner);
  }
}
