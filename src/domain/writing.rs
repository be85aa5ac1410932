//! Notes, documents and creative projects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge;
use crate::slice::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
  pub id: EntityId,
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub tags: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteDraft {
  pub title: String,
  pub body: String,
  pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotePatch {
  pub title: Option<String>,
  pub body: Option<String>,
  pub tags: Option<Vec<String>>,
}

impl Entity for Note {
  type Draft = NoteDraft;
  type Patch = NotePatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: NoteDraft, now: DateTime<Utc>) -> Self {
    Note {
      id,
      title: draft.title,
      body: draft.body,
      tags: draft.tags,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: NotePatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.body, patch.body);
    merge(&mut self.tags, patch.tags);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

/// Long-form document edited in the writing assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id: EntityId,
  pub title: String,
  #[serde(default)]
  pub content: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDraft {
  pub title: String,
  pub content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentPatch {
  pub title: Option<String>,
  pub content: Option<String>,
}

impl Entity for Document {
  type Draft = DocumentDraft;
  type Patch = DocumentPatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: DocumentDraft, now: DateTime<Utc>) -> Self {
    Document {
      id,
      title: draft.title,
      content: draft.content,
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: DocumentPatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.content, patch.content);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

impl Document {
  /// Title derived from the first non-empty line of `content`.
  pub fn title_from(content: &str) -> String {
    content
      .lines()
      .map(str::trim)
      .find(|line| !line.is_empty())
      .map(|line| line.chars().take(60).collect())
      .unwrap_or_else(|| "Untitled".to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeProject {
  pub id: EntityId,
  pub title: String,
  /// e.g. "story", "poem", "script"
  pub medium: String,
  #[serde(default)]
  pub content: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDraft {
  pub title: String,
  pub medium: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
  pub title: Option<String>,
  pub medium: Option<String>,
  pub content: Option<String>,
}

impl Entity for CreativeProject {
  type Draft = ProjectDraft;
  type Patch = ProjectPatch;

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: EntityId, draft: ProjectDraft, now: DateTime<Utc>) -> Self {
    CreativeProject {
      id,
      title: draft.title,
      medium: draft.medium,
      content: String::new(),
      created_at: now,
      updated_at: now,
    }
  }

  fn apply_patch(&mut self, patch: ProjectPatch) {
    merge(&mut self.title, patch.title);
    merge(&mut self.medium, patch.medium);
    merge(&mut self.content, patch.content);
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_title_from_first_line() {
    assert_eq!(Document::title_from("\n  Chapter one  \nbody"), "Chapter one");
    assert_eq!(Document::title_from("   "), "Untitled");
  }
}
