use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge;
use crate::slice::{Entity, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub role: Role,
  pub content: String,
  pub sent_at: DateTime<Utc>,
}

/// Chat thread with the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
  pub id: EntityId,
  pub title: String,
  #[serde(default)]
  pub messages: Vec<Message>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDraft {
  pub title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationPatch {
  pub title: Option<String>,
  pub messages: Option<Vec<Message>>,
}

impl Entity for Conversation {
  type Draft = ConversationDraft;
  type Patch = ConversationPatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: ConversationDraft, now: DateTime<Utc>) -> Self {
    Conversation {
      id,
      title: draft.title,
      messages: Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: ConversationPatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.messages, patch.messages);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

impl Conversation {
  pub fn last_message(&self) -> Option<&Message> {
    self.messages.last()
  }
}
