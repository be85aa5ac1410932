//! Draft editing with debounced autosave and similarity-gated suggestions.
//!
//! Every edit marks the draft dirty and restarts two timers: one that saves
//! the draft, one that asks the remote for writing suggestions. Suggestions
//! are skipped when the text is nearly identical to what was last sent.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::debounce::{DebouncedPipeline, ScopedDebouncer};
use crate::similarity::SimilarityGate;

const AUTOSAVE_KEY: &str = "autosave";
const SUGGEST_KEY: &str = "suggest";

/// Remote side of the writing assistant.
pub trait DocumentRemote: Send + Sync + 'static {
  /// Save `content`, creating the document when `id` is `None`.
  /// Returns the document id.
  fn save(
    &self,
    id: Option<String>,
    content: String,
  ) -> impl Future<Output = color_eyre::Result<String>> + Send;

  fn suggest(&self, content: String) -> impl Future<Output = color_eyre::Result<Vec<String>>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct EditorSettings {
  pub autosave_delay: Duration,
  pub suggestion_delay: Duration,
}

impl Default for EditorSettings {
  fn default() -> Self {
    Self {
      autosave_delay: Duration::from_millis(2000),
      suggestion_delay: Duration::from_millis(1000),
    }
  }
}

/// Local working copy of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftDocument {
  /// `None` until the first successful save
  pub id: Option<String>,
  pub content: String,
  pub dirty: bool,
  pub saving: bool,
  pub last_saved_content: Option<String>,
  pub last_error: Option<String>,
  pub suggestions: Vec<String>,
  last_suggested_for: Option<String>,
}

/// Notifications for whoever mirrors the draft into application state.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftEvent {
  Saved {
    id: String,
    content: String,
    /// First save of a new document
    created: bool,
  },
  SaveFailed(String),
  Suggestions(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  Saved(String),
  /// Nothing dirty, or another save already in flight
  Skipped,
  Failed(String),
}

type SharedDraft = Arc<Mutex<DraftDocument>>;

fn lock(draft: &Mutex<DraftDocument>) -> MutexGuard<'_, DraftDocument> {
  draft.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns one [`DraftDocument`] for the lifetime of an editing screen.
///
/// Dropping the controller (or calling [`DraftController::teardown`])
/// cancels its pending timers. A save already in flight still completes.
pub struct DraftController<R: DocumentRemote> {
  draft: SharedDraft,
  remote: Arc<R>,
  debouncer: ScopedDebouncer,
  gate: SimilarityGate,
  settings: EditorSettings,
  events: mpsc::UnboundedSender<DraftEvent>,
}

impl<R: DocumentRemote> DraftController<R> {
  /// Start editing a new document.
  pub fn new(
    remote: Arc<R>,
    pipeline: &DebouncedPipeline,
    gate: SimilarityGate,
    settings: EditorSettings,
    events: mpsc::UnboundedSender<DraftEvent>,
  ) -> Self {
    Self {
      draft: Arc::new(Mutex::new(DraftDocument::default())),
      remote,
      debouncer: pipeline.scoped(),
      gate,
      settings,
      events,
    }
  }

  /// Start editing an existing, already-saved document.
  pub fn open(mut self, id: impl Into<String>, content: impl Into<String>) -> Self {
    let content = content.into();
    self.draft = Arc::new(Mutex::new(DraftDocument {
      id: Some(id.into()),
      last_saved_content: Some(content.clone()),
      content,
      ..DraftDocument::default()
    }));
    self
  }

  /// Replace the draft content and restart the autosave and suggestion timers.
  pub fn edit(&self, content: impl Into<String>) {
    {
      let mut draft = lock(&self.draft);
      draft.content = content.into();
      draft.dirty = draft.last_saved_content.as_deref() != Some(draft.content.as_str());
    }

    let save = save_draft(
      Arc::clone(&self.draft),
      Arc::clone(&self.remote),
      self.events.clone(),
    );
    self.debouncer.schedule(AUTOSAVE_KEY, self.settings.autosave_delay, async move {
      // Outcome is reported through DraftEvent
      save.await;
    });
    self.debouncer.schedule(
      SUGGEST_KEY,
      self.settings.suggestion_delay,
      fetch_suggestions(
        Arc::clone(&self.draft),
        Arc::clone(&self.remote),
        self.gate,
        self.events.clone(),
      ),
    );
  }

  /// Save immediately, dropping any pending autosave.
  pub async fn save_now(&self) -> SaveOutcome {
    self.debouncer.cancel(AUTOSAVE_KEY);
    save_draft(
      Arc::clone(&self.draft),
      Arc::clone(&self.remote),
      self.events.clone(),
    )
    .await
  }

  pub fn snapshot(&self) -> DraftDocument {
    lock(&self.draft).clone()
  }

  pub fn autosave_pending(&self) -> bool {
    self.debouncer.is_pending(AUTOSAVE_KEY)
  }

  /// Cancel pending timers. Returns how many were cancelled.
  pub fn teardown(&self) -> usize {
    self.debouncer.cancel_all()
  }
}

/// Mark the draft as saving and take what needs to be sent.
fn begin_save(draft: &Mutex<DraftDocument>) -> Option<(Option<String>, String)> {
  let mut draft = lock(draft);
  if !draft.dirty || draft.saving {
    return None;
  }
  draft.saving = true;
  Some((draft.id.clone(), draft.content.clone()))
}

async fn save_draft<R: DocumentRemote>(
  draft: SharedDraft,
  remote: Arc<R>,
  events: mpsc::UnboundedSender<DraftEvent>,
) -> SaveOutcome {
  let Some((mut id, mut content)) = begin_save(&draft) else {
    return SaveOutcome::Skipped;
  };

  loop {
    match remote.save(id.clone(), content.clone()).await {
      Ok(saved_id) => {
        let created = id.is_none();
        let next = {
          let mut draft = lock(&draft);
          if draft.id.is_none() {
            draft.id = Some(saved_id.clone());
          }
          draft.last_saved_content = Some(content.clone());
          draft.last_error = None;
          if draft.content == content {
            draft.dirty = false;
            draft.saving = false;
            None
          } else {
            // Edited while the save was in flight
            Some((draft.id.clone(), draft.content.clone()))
          }
        };

        debug!(id = %saved_id, created, "draft saved");
        let _ = events.send(DraftEvent::Saved {
          id: saved_id.clone(),
          content,
          created,
        });

        match next {
          Some((next_id, next_content)) => {
            id = next_id;
            content = next_content;
          }
          None => return SaveOutcome::Saved(saved_id),
        }
      }
      Err(e) => {
        let message = format!("{:#}", e);
        warn!(error = %message, "draft save failed; will retry on next edit");
        {
          let mut draft = lock(&draft);
          draft.saving = false;
          draft.last_error = Some(message.clone());
        }
        let _ = events.send(DraftEvent::SaveFailed(message.clone()));
        return SaveOutcome::Failed(message);
      }
    }
  }
}

async fn fetch_suggestions<R: DocumentRemote>(
  draft: SharedDraft,
  remote: Arc<R>,
  gate: SimilarityGate,
  events: mpsc::UnboundedSender<DraftEvent>,
) {
  let content = {
    let draft = lock(&draft);
    let previous = draft.last_suggested_for.as_deref().unwrap_or("");
    if !gate.should_proceed(&draft.content, previous) {
      debug!("input too similar to last request; skipping suggestions");
      return;
    }
    draft.content.clone()
  };

  match remote.suggest(content.clone()).await {
    Ok(suggestions) => {
      info!(count = suggestions.len(), "suggestions received");
      {
        let mut draft = lock(&draft);
        draft.last_suggested_for = Some(content);
        draft.suggestions = suggestions.clone();
      }
      let _ = events.send(DraftEvent::Suggestions(suggestions));
    }
    Err(e) => warn!(error = %format!("{:#}", e), "suggestion fetch failed"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

  #[derive(Default)]
  struct RemoteState {
    saves: Mutex<Vec<(Option<String>, String)>>,
    suggest_calls: AtomicU32,
    fail_saves: AtomicBool,
    save_delay_ms: AtomicU32,
  }

  #[derive(Default)]
  struct FakeRemote {
    state: Arc<RemoteState>,
  }

  impl DocumentRemote for FakeRemote {
    fn save(
      &self,
      id: Option<String>,
      content: String,
    ) -> impl Future<Output = color_eyre::Result<String>> + Send {
      let state = Arc::clone(&self.state);
      async move {
        let delay = state.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
          tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if state.fail_saves.load(Ordering::SeqCst) {
          return Err(eyre!("503 service unavailable"));
        }
        state.saves.lock().unwrap().push((id.clone(), content));
        Ok(id.unwrap_or_else(|| "doc-1".to_string()))
      }
    }

    fn suggest(
      &self,
      content: String,
    ) -> impl Future<Output = color_eyre::Result<Vec<String>>> + Send {
      let state = Arc::clone(&self.state);
      async move {
        state.suggest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![format!("{} (polished)", content)])
      }
    }
  }

  fn settings() -> EditorSettings {
    EditorSettings {
      autosave_delay: Duration::from_millis(40),
      suggestion_delay: Duration::from_millis(20),
    }
  }

  fn controller() -> (
    DraftController<FakeRemote>,
    Arc<RemoteState>,
    mpsc::UnboundedReceiver<DraftEvent>,
  ) {
    let remote = FakeRemote::default();
    let state = Arc::clone(&remote.state);
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = DraftController::new(
      Arc::new(remote),
      &DebouncedPipeline::new(),
      SimilarityGate::default(),
      settings(),
      tx,
    );
    (controller, state, rx)
  }

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
  }

  #[tokio::test]
  async fn test_typing_burst_saves_once_with_final_content() {
    let (controller, remote, mut events) = controller();

    for text in ["H", "He", "Hel", "Hello"] {
      controller.edit(text);
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(controller.autosave_pending());
    settle().await;

    let saves = remote.saves.lock().unwrap().clone();
    assert_eq!(saves, vec![(None, "Hello".to_string())]);

    let draft = controller.snapshot();
    assert_eq!(draft.id.as_deref(), Some("doc-1"));
    assert!(!draft.dirty);
    assert!(!draft.saving);

    let mut saw_created = false;
    while let Ok(event) = events.try_recv() {
      if let DraftEvent::Saved { created, .. } = event {
        saw_created = created;
      }
    }
    assert!(saw_created);
  }

  #[tokio::test]
  async fn test_second_save_updates_existing_id() {
    let (controller, remote, _events) = controller();

    controller.edit("first");
    settle().await;
    controller.edit("first, then more");
    settle().await;

    let saves = remote.saves.lock().unwrap().clone();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[1].0.as_deref(), Some("doc-1"));
  }

  #[tokio::test]
  async fn test_failed_save_stays_dirty_and_retries_on_next_edit() {
    let (controller, remote, mut events) = controller();
    remote.fail_saves.store(true, Ordering::SeqCst);

    controller.edit("draft");
    settle().await;

    let draft = controller.snapshot();
    assert!(draft.dirty);
    assert!(draft.id.is_none());
    assert!(draft.last_error.is_some());

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
      failed |= matches!(event, DraftEvent::SaveFailed(_));
    }
    assert!(failed);

    remote.fail_saves.store(false, Ordering::SeqCst);
    controller.edit("draft v2");
    settle().await;
    assert!(!controller.snapshot().dirty);
    assert_eq!(remote.saves.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_teardown_cancels_pending_effects() {
    let (controller, remote, _events) = controller();
    controller.edit("never saved");
    assert_eq!(controller.teardown(), 2);

    settle().await;
    assert!(remote.saves.lock().unwrap().is_empty());
    assert_eq!(remote.suggest_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_drop_cancels_pending_effects() {
    let (controller, remote, _events) = controller();
    controller.edit("never saved");
    drop(controller);

    settle().await;
    assert!(remote.saves.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_similar_input_skips_suggestions() {
    let (controller, remote, _events) = controller();

    controller.edit("hello world");
    settle().await;
    assert_eq!(remote.suggest_calls.load(Ordering::SeqCst), 1);

    // 11 of 12 chars match: similarity above 0.9
    controller.edit("hello world!");
    settle().await;
    assert_eq!(remote.suggest_calls.load(Ordering::SeqCst), 1);

    controller.edit("something else entirely");
    settle().await;
    assert_eq!(remote.suggest_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
      controller.snapshot().suggestions,
      vec!["something else entirely (polished)".to_string()]
    );
  }

  #[tokio::test]
  async fn test_edit_during_save_is_saved_afterwards() {
    let (controller, remote, _events) = controller();
    remote.save_delay_ms.store(60, Ordering::SeqCst);

    controller.edit("v1");
    // Autosave fires at ~40ms and is in flight until ~100ms
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(controller.snapshot().saving);
    controller.edit("v2");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let saves = remote.saves.lock().unwrap().clone();
    assert_eq!(saves.last().map(|s| s.1.as_str()), Some("v2"));
    assert!(!controller.snapshot().dirty);
  }

  #[tokio::test]
  async fn test_save_now_without_changes_is_skipped() {
    let (controller, _remote, _events) = controller();
    assert_eq!(controller.save_now().await, SaveOutcome::Skipped);

    controller.edit("manual");
    assert_eq!(
      controller.save_now().await,
      SaveOutcome::Saved("doc-1".to_string())
    );
    assert!(!controller.autosave_pending());
  }

  #[tokio::test]
  async fn test_open_existing_is_clean() {
    let (controller, remote, _events) = controller();
    let controller = controller.open("doc-9", "saved text");
    assert!(!controller.snapshot().dirty);

    // Typing back to the saved text leaves nothing to save
    controller.edit("saved text!");
    controller.edit("saved text");
    settle().await;
    assert!(remote.saves.lock().unwrap().is_empty());
  }
}
