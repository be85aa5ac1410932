//! Concrete application state: the session plus one entity slice per domain.

mod conversation;
mod home;
mod planner;
mod session;
mod writing;

pub use conversation::{Conversation, ConversationDraft, ConversationPatch, Message, Role};
pub use home::{Device, DeviceDraft, DeviceKind, DevicePatch, Scene, SceneDraft, ScenePatch};
pub use planner::{CalendarEvent, EventDraft, EventPatch, Task, TaskDraft, TaskPatch};
pub use session::{SessionAction, SessionState, User};
pub use writing::{
  CreativeProject, Document, DocumentDraft, DocumentPatch, Note, NoteDraft, NotePatch,
  ProjectDraft, ProjectPatch,
};

use serde::Serialize;
use serde_json::Value;

use crate::slice::{Entity, EntityAction, PersistedSlice, SliceState};
use crate::store::{ActionKind, PersistedStore, Reducer};

pub const SESSION: &str = "session";
pub const CONVERSATIONS: &str = "conversations";
pub const DEVICES: &str = "devices";
pub const SCENES: &str = "scenes";
pub const EVENTS: &str = "events";
pub const TASKS: &str = "tasks";
pub const NOTES: &str = "notes";
pub const DOCUMENTS: &str = "documents";
pub const PROJECTS: &str = "projects";

const SLICE_NAMES: &[&str] = &[
  SESSION,
  CONVERSATIONS,
  DEVICES,
  SCENES,
  EVENTS,
  TASKS,
  NOTES,
  DOCUMENTS,
  PROJECTS,
];

/// Slices persisted when the config does not say otherwise.
///
/// Device and scene state is owned by the hub and always reloaded.
pub const DEFAULT_WHITELIST: &[&str] = &[SESSION, NOTES, TASKS, DOCUMENTS, PROJECTS];

pub type AppStore = PersistedStore<AppState>;

/// Overwrite `slot` when the patch carries a value.
pub(crate) fn merge<T>(slot: &mut T, value: Option<T>) {
  if let Some(value) = value {
    *slot = value;
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
  pub session: SessionState,
  pub conversations: SliceState<Conversation>,
  pub devices: SliceState<Device>,
  pub scenes: SliceState<Scene>,
  pub events: SliceState<CalendarEvent>,
  pub tasks: SliceState<Task>,
  pub notes: SliceState<Note>,
  pub documents: SliceState<Document>,
  pub projects: SliceState<CreativeProject>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "slice", content = "action", rename_all = "snake_case")]
pub enum AppAction {
  Session(SessionAction),
  Conversations(EntityAction<Conversation>),
  Devices(EntityAction<Device>),
  Scenes(EntityAction<Scene>),
  Events(EntityAction<CalendarEvent>),
  Tasks(EntityAction<Task>),
  Notes(EntityAction<Note>),
  Documents(EntityAction<Document>),
  Projects(EntityAction<CreativeProject>),
}

impl ActionKind for AppAction {
  fn namespace(&self) -> &'static str {
    match self {
      AppAction::Session(_) => SESSION,
      AppAction::Conversations(_) => CONVERSATIONS,
      AppAction::Devices(_) => DEVICES,
      AppAction::Scenes(_) => SCENES,
      AppAction::Events(_) => EVENTS,
      AppAction::Tasks(_) => TASKS,
      AppAction::Notes(_) => NOTES,
      AppAction::Documents(_) => DOCUMENTS,
      AppAction::Projects(_) => PROJECTS,
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      AppAction::Session(a) => a.kind(),
      AppAction::Conversations(a) => a.kind(),
      AppAction::Devices(a) => a.kind(),
      AppAction::Scenes(a) => a.kind(),
      AppAction::Events(a) => a.kind(),
      AppAction::Tasks(a) => a.kind(),
      AppAction::Notes(a) => a.kind(),
      AppAction::Documents(a) => a.kind(),
      AppAction::Projects(a) => a.kind(),
    }
  }
}

fn dehydrate<T: Entity>(slice: &SliceState<T>) -> serde_json::Result<Value> {
  serde_json::to_value(slice.to_persisted())
}

fn rehydrate<T: Entity>(slice: &mut SliceState<T>, value: Value) -> serde_json::Result<()> {
  let persisted: PersistedSlice<T> = serde_json::from_value(value)?;
  slice.merge_persisted(persisted);
  Ok(())
}

impl Reducer for AppState {
  type Action = AppAction;

  fn slice_names() -> &'static [&'static str] {
    SLICE_NAMES
  }

  fn reduce(&mut self, action: AppAction) -> Option<&'static str> {
    let name = action.namespace();
    let changed = match action {
      AppAction::Session(a) => self.session.reduce(a),
      AppAction::Conversations(a) => self.conversations.reduce(a),
      AppAction::Devices(a) => self.devices.reduce(a),
      AppAction::Scenes(a) => self.scenes.reduce(a),
      AppAction::Events(a) => self.events.reduce(a),
      AppAction::Tasks(a) => self.tasks.reduce(a),
      AppAction::Notes(a) => self.notes.reduce(a),
      AppAction::Documents(a) => self.documents.reduce(a),
      AppAction::Projects(a) => self.projects.reduce(a),
    };
    changed.then_some(name)
  }

  fn dehydrate_slice(&self, name: &str) -> Option<serde_json::Result<Value>> {
    let value = match name {
      SESSION => serde_json::to_value(self.session.to_persisted()),
      CONVERSATIONS => dehydrate(&self.conversations),
      DEVICES => dehydrate(&self.devices),
      SCENES => dehydrate(&self.scenes),
      EVENTS => dehydrate(&self.events),
      TASKS => dehydrate(&self.tasks),
      NOTES => dehydrate(&self.notes),
      DOCUMENTS => dehydrate(&self.documents),
      PROJECTS => dehydrate(&self.projects),
      _ => return None,
    };
    Some(value)
  }

  fn rehydrate_slice(&mut self, name: &str, value: Value) -> Option<serde_json::Result<()>> {
    let result = match name {
      SESSION => serde_json::from_value(value).map(|s| self.session.merge_persisted(s)),
      CONVERSATIONS => rehydrate(&mut self.conversations, value),
      DEVICES => rehydrate(&mut self.devices, value),
      SCENES => rehydrate(&mut self.scenes, value),
      EVENTS => rehydrate(&mut self.events, value),
      TASKS => rehydrate(&mut self.tasks, value),
      NOTES => rehydrate(&mut self.notes, value),
      DOCUMENTS => rehydrate(&mut self.documents, value),
      PROJECTS => rehydrate(&mut self.projects, value),
      _ => return None,
    };
    Some(result)
  }
}
