//! Generic CRUD-over-collection state shared by every domain.
//!
//! A slice is a pure reducer: it never performs I/O. Load lifecycle actions
//! are dispatched by whichever effect talks to the remote service.

mod id;

pub use id::next_id;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

pub type EntityId = String;

/// A record owned by an [`SliceState`] collection.
pub trait Entity:
  Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
  /// Fields supplied by the caller on create (everything but id and timestamps).
  type Draft: Clone + fmt::Debug + Serialize + Send + Sync + 'static;
  /// Partial update, merged field by field.
  type Patch: Clone + fmt::Debug + Serialize + Send + Sync + 'static;

  fn id(&self) -> &str;

  fn from_draft(id: EntityId, draft: Self::Draft, now: DateTime<Utc>) -> Self;

  /// Shallow-merge `patch` into `self`.
  fn apply_patch(&mut self, patch: Self::Patch);

  /// Refresh the update timestamp.
  fn touch(&mut self, now: DateTime<Utc>);
}

/// Actions understood by every [`SliceState`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[serde(bound = "")]
pub enum EntityAction<T: Entity> {
  LoadRequest,
  LoadSuccess(Vec<T>),
  LoadFailure(String),
  Create {
    id: EntityId,
    at: DateTime<Utc>,
    draft: T::Draft,
  },
  Update {
    id: EntityId,
    at: DateTime<Utc>,
    patch: T::Patch,
  },
  /// Replace the entity with the same id, or append it.
  Upsert(T),
  Remove(EntityId),
  SetSelected(Option<EntityId>),
}

impl<T: Entity> EntityAction<T> {
  /// Build a create action with a fresh id and the current time.
  pub fn create(draft: T::Draft) -> Self {
    EntityAction::Create {
      id: next_id(),
      at: Utc::now(),
      draft,
    }
  }

  /// Build an update action stamped with the current time.
  pub fn update(id: impl Into<EntityId>, patch: T::Patch) -> Self {
    EntityAction::Update {
      id: id.into(),
      at: Utc::now(),
      patch,
    }
  }

  pub fn remove(id: impl Into<EntityId>) -> Self {
    EntityAction::Remove(id.into())
  }

  pub fn select(id: Option<impl Into<EntityId>>) -> Self {
    EntityAction::SetSelected(id.map(Into::into))
  }

  /// Short name used in logs and by the action guard.
  pub fn kind(&self) -> &'static str {
    match self {
      EntityAction::LoadRequest => "load_request",
      EntityAction::LoadSuccess(_) => "load_success",
      EntityAction::LoadFailure(_) => "load_failure",
      EntityAction::Create { .. } => "create",
      EntityAction::Update { .. } => "update",
      EntityAction::Upsert(_) => "upsert",
      EntityAction::Remove(_) => "remove",
      EntityAction::SetSelected(_) => "set_selected",
    }
  }
}

/// Collection state for one domain.
///
/// Insertion order is creation order. `loading` is true only between a
/// `LoadRequest` and its matching success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SliceState<T: Entity> {
  items: Vec<T>,
  selected_id: Option<EntityId>,
  loading: bool,
  error: Option<String>,
}

impl<T: Entity> Default for SliceState<T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      selected_id: None,
      loading: false,
      error: None,
    }
  }
}

/// The durable part of a slice. Load state is transient and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PersistedSlice<T: Entity> {
  #[serde(default)]
  pub items: Vec<T>,
  #[serde(default)]
  pub selected_id: Option<EntityId>,
}

impl<T: Entity> SliceState<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Apply an action. Returns `true` if the state changed.
  pub fn reduce(&mut self, action: EntityAction<T>) -> bool {
    match action {
      EntityAction::LoadRequest => {
        if self.loading {
          return false;
        }
        self.loading = true;
        self.error = None;
        true
      }
      EntityAction::LoadSuccess(items) => {
        self.items = items;
        self.loading = false;
        self.error = None;
        true
      }
      EntityAction::LoadFailure(message) => {
        // Existing items are kept: stale data is better than none
        self.loading = false;
        self.error = Some(message);
        true
      }
      EntityAction::Create { id, at, draft } => {
        if self.position(&id).is_some() {
          return false;
        }
        self.items.push(T::from_draft(id, draft, at));
        true
      }
      EntityAction::Update { id, at, patch } => match self.position(&id) {
        Some(index) => {
          let item = &mut self.items[index];
          item.apply_patch(patch);
          item.touch(at);
          true
        }
        None => false,
      },
      EntityAction::Upsert(entity) => {
        match self.position(entity.id()) {
          Some(index) => {
            if self.items[index] == entity {
              return false;
            }
            self.items[index] = entity;
          }
          None => self.items.push(entity),
        }
        true
      }
      EntityAction::Remove(id) => {
        let Some(index) = self.position(&id) else {
          return false;
        };
        self.items.remove(index);
        if self.selected_id.as_deref() == Some(id.as_str()) {
          self.selected_id = None;
        }
        true
      }
      EntityAction::SetSelected(id) => {
        // No existence check: selection may precede the load
        if self.selected_id == id {
          return false;
        }
        self.selected_id = id;
        true
      }
    }
  }

  fn position(&self, id: &str) -> Option<usize> {
    self.items.iter().position(|item| item.id() == id)
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn get(&self, id: &str) -> Option<&T> {
    self.items.iter().find(|item| item.id() == id)
  }

  pub fn selected_id(&self) -> Option<&str> {
    self.selected_id.as_deref()
  }

  /// The selected entity, or `None` when nothing is selected or the
  /// selection is dangling.
  pub fn selected(&self) -> Option<&T> {
    self.selected_id.as_deref().and_then(|id| self.get(id))
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn to_persisted(&self) -> PersistedSlice<T> {
    PersistedSlice {
      items: self.items.clone(),
      selected_id: self.selected_id.clone(),
    }
  }

  /// Merge persisted data over this (initial) state.
  pub fn merge_persisted(&mut self, persisted: PersistedSlice<T>) {
    self.items = persisted.items;
    self.selected_id = persisted.selected_id;
  }
}
