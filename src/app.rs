//! Composition root: storage, store, loaders and the editor pipeline.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheAsideLoader, CachedResource, Loaded, RefreshHandle};
use crate::config::Config;
use crate::debounce::DebouncedPipeline;
use crate::domain::{
  AppAction, AppState, AppStore, Document, DocumentPatch, Note, NoteDraft, Task, TaskDraft,
  TaskPatch,
};
use crate::editor::{DocumentRemote, DraftController, DraftEvent};
use crate::error::{Error, Result};
use crate::remote::RemoteClient;
use crate::slice::{next_id, EntityAction, EntityId};
use crate::storage::{KeyValueStore, SqliteStore};
use crate::store::{PersistedStore, RehydrationPhase};

/// Namespace for ad-hoc remote JSON resources
const RESOURCE_NAMESPACE: &str = "resources";

/// Snapshot printed by `localsync status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
  pub phase: RehydrationPhase,
  pub user: Option<String>,
  pub restored: Vec<String>,
  pub whitelist: Vec<String>,
  pub counts: Vec<(&'static str, usize)>,
}

/// Result of [`App::fetch`]: the data to show now, plus the refresh started
/// when that data was stale.
#[derive(Debug)]
pub struct Fetched {
  pub loaded: Loaded<Value>,
  pub refresh: Option<RefreshHandle<Value>>,
}

impl Fetched {
  /// Wait up to `limit` for the background refresh to land in the cache.
  ///
  /// `Ok(None)` when no refresh was started.
  pub async fn settle(&mut self, limit: Duration) -> Result<Option<CachedResource<Value>>> {
    let Some(handle) = self.refresh.take() else {
      return Ok(None);
    };
    match tokio::time::timeout(limit, handle).await {
      Ok(Ok(result)) => result.map(Some),
      Ok(Err(e)) => Err(Error::Network(format!("Refresh task failed: {}", e))),
      Err(_) => Err(Error::Network(format!(
        "Refresh still running after {}ms",
        limit.as_millis()
      ))),
    }
  }
}

/// Main application state
pub struct App {
  config: Config,
  storage: Arc<dyn KeyValueStore>,
  store: AppStore,
  pipeline: DebouncedPipeline,
  resources: CacheAsideLoader<Value>,
  remote: Option<RemoteClient>,
  restored: Vec<String>,
}

impl App {
  /// Open the SQLite database under `config.data_dir` and rehydrate.
  pub fn new(config: Config) -> Result<Self> {
    let storage = SqliteStore::open(&SqliteStore::path_in(&config.data_dir))?;
    Self::with_storage(config, Arc::new(storage))
  }

  pub fn with_storage(config: Config, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
    let store = PersistedStore::configure(
      AppState::default(),
      Arc::clone(&storage),
      config.persist_config(),
    )?;
    let restored = store.rehydrate();

    let remote = match &config.remote.base_url {
      Some(url) => Some(
        RemoteClient::new(url, Config::remote_token())
          .map_err(|e| Error::Config(format!("{:#}", e)))?,
      ),
      None => None,
    };

    Ok(Self {
      resources: CacheAsideLoader::new(Arc::clone(&storage), RESOURCE_NAMESPACE),
      pipeline: DebouncedPipeline::new(),
      config,
      storage,
      store,
      remote,
      restored,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn store(&self) -> &AppStore {
    &self.store
  }

  pub fn status(&self) -> Result<Status> {
    let (user, counts) = self.store.select(|s| {
      let user = s.session.user().map(|u| u.name.clone());
      let counts = vec![
        ("conversations", s.conversations.len()),
        ("devices", s.devices.len()),
        ("scenes", s.scenes.len()),
        ("events", s.events.len()),
        ("tasks", s.tasks.len()),
        ("notes", s.notes.len()),
        ("documents", s.documents.len()),
        ("projects", s.projects.len()),
      ];
      (user, counts)
    })?;

    Ok(Status {
      phase: self.store.phase(),
      user,
      restored: self.restored.clone(),
      whitelist: self.store.config().whitelist.iter().cloned().collect(),
      counts,
    })
  }

  pub fn add_note(&self, title: &str, body: &str, tags: Vec<String>) -> Result<EntityId> {
    let id = next_id();
    self.store.dispatch(AppAction::Notes(EntityAction::Create {
      id: id.clone(),
      at: Utc::now(),
      draft: NoteDraft {
        title: title.to_string(),
        body: body.to_string(),
        tags,
      },
    }))?;
    Ok(id)
  }

  pub fn notes(&self) -> Result<(Vec<Note>, Option<EntityId>)> {
    self
      .store
      .select(|s| (s.notes.items().to_vec(), s.notes.selected_id().map(String::from)))
  }

  /// Returns `false` when no note has that id.
  pub fn remove_note(&self, id: &str) -> Result<bool> {
    self.store.dispatch(AppAction::Notes(EntityAction::remove(id)))
  }

  pub fn select_note(&self, id: Option<&str>) -> Result<bool> {
    self.store.dispatch(AppAction::Notes(EntityAction::select(id)))
  }

  pub fn add_task(&self, title: &str) -> Result<EntityId> {
    let id = next_id();
    self.store.dispatch(AppAction::Tasks(EntityAction::Create {
      id: id.clone(),
      at: Utc::now(),
      draft: TaskDraft {
        title: title.to_string(),
        due: None,
      },
    }))?;
    Ok(id)
  }

  pub fn tasks(&self) -> Result<Vec<Task>> {
    self.store.select(|s| s.tasks.items().to_vec())
  }

  pub fn complete_task(&self, id: &str) -> Result<bool> {
    self.store.dispatch(AppAction::Tasks(EntityAction::update(
      id,
      TaskPatch {
        done: Some(true),
        ..TaskPatch::default()
      },
    )))
  }

  /// Cache-aside load of a remote JSON resource.
  ///
  /// `resource` is the cache key; `path` defaults to it. Without a configured
  /// remote only cached data can be served.
  pub async fn fetch(&self, resource: &str, path: Option<&str>) -> Result<Fetched> {
    let path = path.unwrap_or(resource);
    let ttl = self.config.cache_ttl();
    let (loaded, refresh) = match &self.remote {
      Some(remote) => {
        self
          .resources
          .load_tracked(resource, remote.fetcher(path), ttl)
          .await?
      }
      None => {
        self
          .resources
          .load_tracked(
            resource,
            || async { Err(color_eyre::eyre::eyre!("remote.base_url is not configured")) },
            ttl,
          )
          .await?
      }
    };
    Ok(Fetched { loaded, refresh })
  }

  pub fn resources(&self) -> &CacheAsideLoader<Value> {
    &self.resources
  }

  pub fn clear_cache(&self) -> Result<usize> {
    let removed = self.resources.clear()?;
    info!(removed, "cache cleared");
    Ok(removed)
  }

  pub fn purge(&self) -> Result<()> {
    self.store.purge()
  }

  /// Editor backed by the configured remote.
  pub fn open_editor(
    &self,
    document_id: Option<&str>,
  ) -> Result<(DraftController<RemoteClient>, JoinHandle<()>)> {
    let remote = self
      .remote
      .clone()
      .ok_or_else(|| Error::Config("remote.base_url is not configured".to_string()))?;
    self.open_editor_with(Arc::new(remote), document_id)
  }

  /// Start a [`DraftController`] whose saves are mirrored into the
  /// documents slice. The returned task ends once the controller is dropped.
  pub fn open_editor_with<R: DocumentRemote>(
    &self,
    remote: Arc<R>,
    document_id: Option<&str>,
  ) -> Result<(DraftController<R>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = DraftController::new(
      remote,
      &self.pipeline,
      self.config.similarity_gate(),
      self.config.editor_settings(),
      tx,
    );

    let controller = match document_id {
      Some(id) => {
        let content = self
          .store
          .select(|s| s.documents.get(id).map(|d| d.content.clone()))?
          .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        controller.open(id, content)
      }
      None => controller,
    };

    let forwarder = tokio::spawn(forward_draft_events(self.store.clone(), rx));
    Ok((controller, forwarder))
  }

  pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
    &self.storage
  }
}

async fn forward_draft_events(store: AppStore, mut events: mpsc::UnboundedReceiver<DraftEvent>) {
  while let Some(event) = events.recv().await {
    if let Err(e) = record_draft_event(&store, event) {
      warn!(error = %e, "failed to record draft event");
    }
  }
  debug!("draft event channel closed");
}

/// Mirror a saved draft into the documents slice.
pub fn record_draft_event(store: &AppStore, event: DraftEvent) -> Result<()> {
  let DraftEvent::Saved { id, content, .. } = event else {
    return Ok(());
  };

  let exists = store.select(|s| s.documents.get(&id).is_some())?;
  let title = Document::title_from(&content);
  let action = if exists {
    EntityAction::update(
      id,
      DocumentPatch {
        title: Some(title),
        content: Some(content),
      },
    )
  } else {
    let now = Utc::now();
    EntityAction::Upsert(Document {
      id,
      title,
      content,
      created_at: now,
      updated_at: now,
    })
  };
  store.dispatch(AppAction::Documents(action))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::editor::SaveOutcome;
  use crate::storage::MemoryStore;
  use std::future::Future;
  use std::time::Duration;

  fn app(storage: Arc<MemoryStore>) -> App {
    App::with_storage(Config::default(), storage).unwrap()
  }

  struct EchoRemote;

  impl DocumentRemote for EchoRemote {
    fn save(
      &self,
      id: Option<String>,
      _content: String,
    ) -> impl Future<Output = color_eyre::Result<String>> + Send {
      async move { Ok(id.unwrap_or_else(|| "remote-doc".to_string())) }
    }

    fn suggest(
      &self,
      _content: String,
    ) -> impl Future<Output = color_eyre::Result<Vec<String>>> + Send {
      async { Ok(Vec::new()) }
    }
  }

  #[test]
  fn test_notes_survive_restart() {
    let storage = Arc::new(MemoryStore::new());
    let first = app(storage.clone());
    let id = first.add_note("Groceries", "milk", vec![]).unwrap();
    first.select_note(Some(&id)).unwrap();

    let second = app(storage);
    let (notes, selected) = second.notes().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Groceries");
    assert_eq!(selected.as_deref(), Some(id.as_str()));
    assert!(second.status().unwrap().restored.contains(&"notes".to_string()));
  }

  #[test]
  fn test_complete_and_remove() {
    let app = app(Arc::new(MemoryStore::new()));
    let task = app.add_task("Water plants").unwrap();
    assert!(app.complete_task(&task).unwrap());
    assert!(app.tasks().unwrap()[0].done);

    assert!(!app.remove_note("missing").unwrap());
  }

  #[test]
  fn test_status_counts() {
    let app = app(Arc::new(MemoryStore::new()));
    app.add_task("a").unwrap();
    app.add_task("b").unwrap();

    let status = app.status().unwrap();
    assert_eq!(status.phase, RehydrationPhase::Ready);
    assert!(status.user.is_none());
    assert!(status.counts.contains(&("tasks", 2)));
  }

  #[tokio::test]
  async fn test_fetch_without_remote_serves_cache_only() {
    let app = app(Arc::new(MemoryStore::new()));
    assert!(matches!(
      app.fetch("devices", None).await,
      Err(Error::Network(_))
    ));

    app
      .resources()
      .put("devices", serde_json::json!([{"id": "lamp"}]))
      .unwrap();
    let fetched = app.fetch("devices", None).await.unwrap();
    assert_eq!(fetched.loaded.data[0]["id"], "lamp");
    assert_eq!(app.clear_cache().unwrap(), 1);
  }

  /// Serves one JSON response after a short delay, then exits.
  fn serve_once(body: &'static str) -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = std::thread::spawn(move || {
      let (mut stream, _) = listener.accept().unwrap();
      let mut buf = [0u8; 4096];
      let _ = stream.read(&mut buf).unwrap();
      std::thread::sleep(Duration::from_millis(50));
      let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
      );
      stream.write_all(response.as_bytes()).unwrap();
    });
    (addr, server)
  }

  #[test]
  fn test_stale_fetch_refresh_outlives_runtime() {
    let (addr, server) = serve_once(r#"{"v":2}"#);
    let mut config = Config::default();
    config.remote.base_url = Some(format!("http://{}/", addr));
    config.cache.ttl_secs = 0;
    let app = App::with_storage(config, Arc::new(MemoryStore::new())).unwrap();
    app
      .resources()
      .put("devices", serde_json::json!({"v": 1}))
      .unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (source, refreshed) = runtime.block_on(async {
      let mut fetched = app.fetch("devices", None).await.unwrap();
      let refreshed = fetched.settle(Duration::from_secs(5)).await.unwrap();
      (fetched.loaded.source, refreshed)
    });
    drop(runtime);
    server.join().unwrap();

    assert_eq!(source, crate::cache::CacheSource::Cache);
    assert_eq!(refreshed.unwrap().payload, serde_json::json!({"v": 2}));
    assert_eq!(
      app.resources().peek("devices").unwrap().unwrap().payload,
      serde_json::json!({"v": 2})
    );
  }

  #[tokio::test]
  async fn test_settle_without_refresh_is_none() {
    let app = app(Arc::new(MemoryStore::new()));
    app
      .resources()
      .put("devices", serde_json::json!([]))
      .unwrap();

    let mut fetched = app.fetch("devices", None).await.unwrap();
    assert!(fetched.refresh.is_none());
    assert!(fetched.settle(Duration::from_millis(10)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_saved_draft_lands_in_documents() {
    let storage = Arc::new(MemoryStore::new());
    let app = app(storage.clone());
    let (editor, forwarder) = app
      .open_editor_with(Arc::new(EchoRemote), None)
      .unwrap();

    editor.edit("Chapter one\nIt was a dark night.");
    assert_eq!(
      editor.save_now().await,
      SaveOutcome::Saved("remote-doc".to_string())
    );
    drop(editor);
    tokio::time::timeout(Duration::from_secs(1), forwarder)
      .await
      .unwrap()
      .unwrap();

    let doc = app
      .store()
      .select(|s| s.documents.get("remote-doc").cloned())
      .unwrap()
      .unwrap();
    assert_eq!(doc.title, "Chapter one");

    let restored = self::app(storage);
    assert_eq!(
      restored.store().select(|s| s.documents.len()).unwrap(),
      1
    );
  }

  #[test]
  fn test_record_update_keeps_created_at() {
    let app = app(Arc::new(MemoryStore::new()));
    let saved = |content: &str| DraftEvent::Saved {
      id: "d1".to_string(),
      content: content.to_string(),
      created: false,
    };
    record_draft_event(app.store(), saved("first")).unwrap();
    let created_at = app
      .store()
      .select(|s| s.documents.get("d1").map(|d| d.created_at))
      .unwrap();
    record_draft_event(app.store(), saved("second")).unwrap();

    let doc = app
      .store()
      .select(|s| s.documents.get("d1").cloned())
      .unwrap()
      .unwrap();
    assert_eq!(doc.content, "second");
    assert_eq!(Some(doc.created_at), created_at);
  }

  #[test]
  fn test_open_editor_requires_remote() {
    let app = app(Arc::new(MemoryStore::new()));
    assert!(matches!(app.open_editor(None), Err(Error::Config(_))));
  }
}
