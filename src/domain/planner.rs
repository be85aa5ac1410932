//! Calendar events and tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge;
use crate::slice::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
  pub id: EntityId,
  pub title: String,
  pub starts_at: DateTime<Utc>,
  pub ends_at: Option<DateTime<Utc>>,
  pub location: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDraft {
  pub title: String,
  pub starts_at: DateTime<Utc>,
  pub ends_at: Option<DateTime<Utc>>,
  pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventPatch {
  pub title: Option<String>,
  pub starts_at: Option<DateTime<Utc>>,
  pub ends_at: Option<Option<DateTime<Utc>>>,
  pub location: Option<Option<String>>,
}

impl Entity for CalendarEvent {
  type Draft = EventDraft;
  type Patch = EventPatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: EventDraft, now: DateTime<Utc>) -> Self {
    CalendarEvent {
      id,
      title: draft.title,
      starts_at: draft.starts_at,
      ends_at: draft.ends_at,
      location: draft.location,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: EventPatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.starts_at, patch.starts_at);
    merge(&mut self.ends_at, patch.ends_at);
    merge(&mut self.location, patch.location);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: EntityId,
  pub title: String,
  #[serde(default)]
  pub done: bool,
  pub due: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDraft {
  pub title: String,
  pub due: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
  pub title: Option<String>,
  pub done: Option<bool>,
  pub due: Option<Option<DateTime<Utc>>>,
}

impl Entity for Task {
  type Draft = TaskDraft;
  type Patch = TaskPatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: TaskDraft, now: DateTime<Utc>) -> Self {
    Task {
      id,
      title: draft.title,
      done: false,
      due: draft.due,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: TaskPatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.done, patch.done);
    merge(&mut self.due, patch.due);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}
