use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::DEFAULT_WHITELIST;
use crate::editor::EditorSettings;
use crate::error::{Error, Result};
use crate::similarity::SimilarityGate;
use crate::store::PersistConfig;

pub const TOKEN_ENV: &str = "LOCALSYNC_REMOTE_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Directory holding the SQLite database and log files
  pub data_dir: PathBuf,
  pub persist: PersistSection,
  pub cache: CacheSection,
  pub editor: EditorSection,
  pub remote: RemoteSection,
  pub logging: LoggingSection,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      persist: PersistSection::default(),
      cache: CacheSection::default(),
      editor: EditorSection::default(),
      remote: RemoteSection::default(),
      logging: LoggingSection::default(),
    }
  }
}

fn default_data_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("localsync")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistSection {
  pub key: String,
  pub version: u32,
  /// Slice names written to disk
  pub whitelist: Vec<String>,
}

impl Default for PersistSection {
  fn default() -> Self {
    Self {
      key: "root".to_string(),
      version: 1,
      whitelist: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
  pub ttl_secs: u64,
}

impl Default for CacheSection {
  fn default() -> Self {
    Self { ttl_secs: 300 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditorSection {
  pub autosave_ms: u64,
  pub suggestion_ms: u64,
  pub similarity_threshold: f64,
  pub max_compare_chars: usize,
}

impl Default for EditorSection {
  fn default() -> Self {
    let settings = EditorSettings::default();
    let gate = SimilarityGate::default();
    Self {
      autosave_ms: settings.autosave_delay.as_millis() as u64,
      suggestion_ms: settings.suggestion_delay.as_millis() as u64,
      similarity_threshold: gate.threshold(),
      max_compare_chars: crate::similarity::DEFAULT_MAX_CHARS,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
  /// Base URL of the JSON API (e.g., "https://api.example.com/v1/")
  pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
  /// Default filter directive; `RUST_LOG` takes precedence
  pub level: String,
  /// Write daily-rolling log files under `<data_dir>/logs` instead of stderr
  pub file: bool,
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      file: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./localsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/localsync/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("localsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("localsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::Config(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::parse(&contents)
      .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)
      .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.editor.similarity_threshold) {
      return Err(Error::Config(format!(
        "editor.similarity_threshold must be within 0..=1, got {}",
        self.editor.similarity_threshold
      )));
    }
    if self.persist.key.trim().is_empty() {
      return Err(Error::Config("persist.key must not be empty".to_string()));
    }
    Ok(())
  }

  /// Envelope settings; the storage key is `persist:<key>`.
  pub fn persist_config(&self) -> PersistConfig {
    PersistConfig::new(
      format!("persist:{}", self.persist.key),
      self.persist.version,
      self.persist.whitelist.iter().cloned(),
    )
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache.ttl_secs)
  }

  pub fn editor_settings(&self) -> EditorSettings {
    EditorSettings {
      autosave_delay: Duration::from_millis(self.editor.autosave_ms),
      suggestion_delay: Duration::from_millis(self.editor.suggestion_ms),
    }
  }

  pub fn similarity_gate(&self) -> SimilarityGate {
    SimilarityGate::new(self.editor.similarity_threshold)
      .with_max_chars(self.editor.max_compare_chars)
  }

  /// Get the remote bearer token from the environment, if set.
  pub fn remote_token() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
  }
}
