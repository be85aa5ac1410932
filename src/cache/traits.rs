//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Anything that can be stored as a cached payload.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
  /// Served from the local cache
  Cache,
  /// Fresh data from network
  Network,
}

impl CacheSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      CacheSource::Cache => "cache",
      CacheSource::Network => "network",
    }
  }
}

/// A cached payload. At most one entry exists per key, and `fetched_at`
/// only moves forward for a given key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct CachedResource<T: Cacheable> {
  pub key: String,
  pub payload: T,
  pub fetched_at: DateTime<Utc>,
  pub source: CacheSource,
}

impl<T: Cacheable> CachedResource<T> {
  /// Age of the entry relative to now.
  pub fn age(&self) -> chrono::Duration {
    Utc::now() - self.fetched_at
  }

  /// Whether the entry is younger than `ttl`.
  pub fn is_fresh(&self, ttl: std::time::Duration) -> bool {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
    self.age() < ttl
  }
}

/// Result of a load, including metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched from the network
  pub fetched_at: DateTime<Utc>,
}

impl<T: Cacheable> Loaded<T> {
  pub fn from_cache(entry: CachedResource<T>) -> Self {
    Self {
      data: entry.payload,
      source: CacheSource::Cache,
      fetched_at: entry.fetched_at,
    }
  }

  pub fn from_network(entry: CachedResource<T>) -> Self {
    Self {
      data: entry.payload,
      source: CacheSource::Network,
      fetched_at: entry.fetched_at,
    }
  }
}

/// Notification published by a loader after a background refresh.
#[derive(Debug, Clone)]
pub enum CacheEvent<T: Cacheable> {
  /// Fresh value written to the cache
  Refreshed(CachedResource<T>),
  /// Remote fetch failed; the cached value is still being served
  RefreshFailed { key: String, message: String },
}

impl<T: Cacheable> CacheEvent<T> {
  pub fn key(&self) -> &str {
    match self {
      CacheEvent::Refreshed(entry) => &entry.key,
      CacheEvent::RefreshFailed { key, .. } => key,
    }
  }
}
