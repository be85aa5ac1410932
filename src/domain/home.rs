//! Smart-home devices and scenes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge;
use crate::slice::{Entity, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
  Light,
  Thermostat,
  Lock,
  Plug,
  Sensor,
  Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
  pub id: EntityId,
  pub name: String,
  pub kind: DeviceKind,
  pub room: Option<String>,
  #[serde(default)]
  pub is_on: bool,
  /// Brightness, set point or reading, depending on kind
  pub value: Option<f64>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDraft {
  pub name: String,
  pub kind: DeviceKind,
  pub room: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevicePatch {
  pub name: Option<String>,
  pub room: Option<Option<String>>,
  pub is_on: Option<bool>,
  pub value: Option<Option<f64>>,
}

impl Entity for Device {
  type Draft = DeviceDraft;
  type Patch = DevicePatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: DeviceDraft, now: DateTime<Utc>) -> Self {
    Device {
      id,
      name: draft.name,
      kind: draft.kind,
      room: draft.room,
      is_on: false,
      value: None,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: DevicePatch) {
    merge(&mut self.name, patch.name);
    merge(&mut self.room, patch.room);
    merge(&mut self.is_on, patch.is_on);
    merge(&mut self.value, patch.value);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

/// A named set of devices switched together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
  pub id: EntityId,
  pub name: String,
  #[serde(default)]
  pub device_ids: Vec<EntityId>,
  #[serde(default)]
  pub active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneDraft {
  pub name: String,
  pub device_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenePatch {
  pub name: Option<String>,
  pub device_ids: Option<Vec<EntityId>>,
  pub active: Option<bool>,
}

impl Entity for Scene {
  type Draft = SceneDraft;
  type Patch = ScenePatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: SceneDraft, now: DateTime<Utc>) -> Self {
    Scene {
      id,
      name: draft.name,
      device_ids: draft.device_ids,
      active: false,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: ScenePatch) {
    merge(&mut self.name, patch.name);
    merge(&mut self.device_ids, patch.device_ids);
    merge(&mut self.active, patch.active);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}
