//! Cache-aside loader that serves local data first and refreshes from the
//! network in the background.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::key::{namespace_prefix, normalize, storage_key};
use super::traits::{CacheEvent, CacheSource, CachedResource, Cacheable, Loaded};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;

const EVENT_CAPACITY: usize = 64;

/// Background refresh started for a stale entry.
pub type RefreshHandle<T> = JoinHandle<Result<CachedResource<T>>>;

/// Cache-aside loader for one resource type.
///
/// This layer sits between the application and a remote fetcher, providing
/// cache-first reads with network confirmation. Concurrent loads of the same
/// key are not coordinated: each may write the cache, and the last to finish
/// wins.
pub struct CacheAsideLoader<T: Cacheable> {
  storage: Arc<dyn KeyValueStore>,
  namespace: Arc<str>,
  events: broadcast::Sender<CacheEvent<T>>,
}

impl<T: Cacheable> CacheAsideLoader<T> {
  /// Create a loader whose entries live under `namespace` in `storage`.
  pub fn new(storage: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      storage,
      namespace: Arc::from(namespace),
      events,
    }
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  /// Receive refresh notifications for every key of this loader.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent<T>> {
    self.events.subscribe()
  }

  /// Load `key` cache-first.
  ///
  /// 1. If a cached entry exists, return it immediately. When it is older
  ///    than `ttl`, `fetch_remote` runs in the background and its result is
  ///    written to the cache and published to subscribers.
  /// 2. Without a cached entry, await `fetch_remote`; its failure is the
  ///    result.
  ///
  /// `ttl` only decides whether a refresh is attempted; stale entries are
  /// still served.
  pub async fn load<F, Fut>(&self, key: &str, fetch_remote: F, ttl: Duration) -> Result<Loaded<T>>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = color_eyre::Result<T>> + Send + 'static,
  {
    // Failures are published as events; the caller already has data
    let (loaded, _refresh) = self.load_tracked(key, fetch_remote, ttl).await?;
    Ok(loaded)
  }

  /// Same as [`load`](Self::load), but also hands back the background
  /// refresh started for a stale entry.
  ///
  /// Short-lived callers await the handle before their runtime shuts down;
  /// otherwise the refresh is cancelled with it.
  pub async fn load_tracked<F, Fut>(
    &self,
    key: &str,
    fetch_remote: F,
    ttl: Duration,
  ) -> Result<(Loaded<T>, Option<RefreshHandle<T>>)>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = color_eyre::Result<T>> + Send + 'static,
  {
    let cached = self.peek(key).unwrap_or_else(|e| {
      warn!(namespace = %self.namespace, key, error = %e, "cache read failed; treating as miss");
      None
    });

    match cached {
      Some(entry) if entry.is_fresh(ttl) => {
        debug!(namespace = %self.namespace, key, "serving fresh cache");
        Ok((Loaded::from_cache(entry), None))
      }
      Some(entry) => {
        debug!(namespace = %self.namespace, key, "serving stale cache; refreshing");
        let loader = self.clone();
        let key = key.to_string();
        let handle = tokio::spawn(async move { loader.refresh(&key, fetch_remote).await });
        Ok((Loaded::from_cache(entry), Some(handle)))
      }
      None => {
        // No cache, must fetch from network
        let payload = fetch_remote()
          .await
          .map_err(|e| Error::Network(format!("{:#}", e)))?;
        let entry = self.write_or_wrap(key, payload);
        Ok((Loaded::from_network(entry), None))
      }
    }
  }

  /// Fetch `key` from the network now and write the result to the cache.
  ///
  /// Subscribers see either `Refreshed` or `RefreshFailed`. On failure the
  /// existing entry is left untouched.
  pub async fn refresh<F, Fut>(&self, key: &str, fetch_remote: F) -> Result<CachedResource<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = color_eyre::Result<T>>,
  {
    match fetch_remote().await {
      Ok(payload) => {
        let entry = self.write_or_wrap(key, payload);
        let _ = self.events.send(CacheEvent::Refreshed(entry.clone()));
        Ok(entry)
      }
      Err(e) => {
        let message = format!("{:#}", e);
        warn!(namespace = %self.namespace, key, error = %message, "background refresh failed");
        let _ = self.events.send(CacheEvent::RefreshFailed {
          key: key.to_string(),
          message: message.clone(),
        });
        Err(Error::Network(message))
      }
    }
  }

  /// Read the cached entry for `key` without touching the network.
  pub fn peek(&self, key: &str) -> Result<Option<CachedResource<T>>> {
    let Some(raw) = self.storage.get(&storage_key(&self.namespace, key))? else {
      return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
  }

  /// Write `payload` as the current value of `key`.
  ///
  /// The stored entry carries the trimmed key.
  pub fn put(&self, key: &str, payload: T) -> Result<CachedResource<T>> {
    let entry = CachedResource {
      key: normalize(key).to_string(),
      payload,
      fetched_at: self.next_fetched_at(key),
      source: CacheSource::Network,
    };
    let raw = serde_json::to_string(&entry)?;
    self
      .storage
      .set(&storage_key(&self.namespace, key), &raw)?;
    Ok(entry)
  }

  /// Drop the cached entry for `key`.
  pub fn invalidate(&self, key: &str) -> Result<()> {
    self.storage.remove(&storage_key(&self.namespace, key))
  }

  /// Drop every entry of this loader's namespace. Returns how many were removed.
  pub fn clear(&self) -> Result<usize> {
    let keys = self
      .storage
      .keys_with_prefix(&namespace_prefix(&self.namespace))?;
    for key in &keys {
      self.storage.remove(key)?;
    }
    Ok(keys.len())
  }

  /// Persist a network result. A storage failure is logged and the fresh
  /// value is still handed back to the caller.
  fn write_or_wrap(&self, key: &str, payload: T) -> CachedResource<T> {
    match self.put(key, payload.clone()) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(namespace = %self.namespace, key, error = %e, "cache write dropped");
        CachedResource {
          key: normalize(key).to_string(),
          payload,
          fetched_at: self.next_fetched_at(key),
          source: CacheSource::Network,
        }
      }
    }
  }

  /// Now, or just after the stored entry's timestamp: `fetched_at` never
  /// goes backwards for a key.
  fn next_fetched_at(&self, key: &str) -> DateTime<Utc> {
    let now = Utc::now();
    match self.peek(key).ok().flatten() {
      Some(prev) if prev.fetched_at >= now => prev.fetched_at + chrono::Duration::milliseconds(1),
      _ => now,
    }
  }
}

impl<T: Cacheable> Clone for CacheAsideLoader<T> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      namespace: Arc::clone(&self.namespace),
      events: self.events.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;
  use color_eyre::eyre::eyre;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Instant;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Version {
    v: u32,
  }

  fn loader() -> CacheAsideLoader<Version> {
    CacheAsideLoader::new(Arc::new(MemoryStore::new()), "test")
  }

  #[tokio::test]
  async fn test_cache_first_then_refresh() {
    let loader = loader();
    loader.put("k", Version { v: 1 }).unwrap();
    let mut events = loader.subscribe();

    let started = Instant::now();
    let result = loader
      .load(
        "k",
        || async {
          tokio::time::sleep(Duration::from_millis(50)).await;
          Ok(Version { v: 2 })
        },
        Duration::ZERO,
      )
      .await
      .unwrap();

    assert!(started.elapsed() < Duration::from_millis(40));
    assert_eq!(result.data, Version { v: 1 });
    assert_eq!(result.source, CacheSource::Cache);

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, CacheEvent::Refreshed(ref e) if e.payload.v == 2));
    assert_eq!(loader.peek("k").unwrap().unwrap().payload, Version { v: 2 });
  }

  #[tokio::test]
  async fn test_stale_load_hands_back_refresh() {
    let loader = loader();
    loader.put("k", Version { v: 1 }).unwrap();

    let (loaded, refresh) = loader
      .load_tracked(
        "k",
        || async {
          tokio::time::sleep(Duration::from_millis(30)).await;
          Ok(Version { v: 2 })
        },
        Duration::ZERO,
      )
      .await
      .unwrap();
    assert_eq!(loaded.data, Version { v: 1 });

    let entry = refresh.unwrap().await.unwrap().unwrap();
    assert_eq!(entry.payload, Version { v: 2 });
    assert_eq!(loader.peek("k").unwrap().unwrap().payload, Version { v: 2 });
  }

  #[tokio::test]
  async fn test_fresh_and_miss_have_no_refresh() {
    let loader = loader();
    let (loaded, refresh) = loader
      .load_tracked("k", || async { Ok(Version { v: 1 }) }, Duration::from_secs(60))
      .await
      .unwrap();
    assert_eq!(loaded.source, CacheSource::Network);
    assert!(refresh.is_none());

    let (loaded, refresh) = loader
      .load_tracked("k", || async { Ok(Version { v: 2 }) }, Duration::from_secs(60))
      .await
      .unwrap();
    assert_eq!(loaded.data, Version { v: 1 });
    assert!(refresh.is_none());
  }

  #[tokio::test]
  async fn test_refresh_failure_keeps_cache() {
    let loader = loader();
    loader.put("k", Version { v: 1 }).unwrap();
    let mut events = loader.subscribe();

    let result = loader
      .load(
        "k",
        || async {
          tokio::time::sleep(Duration::from_millis(20)).await;
          Err(eyre!("connection reset"))
        },
        Duration::ZERO,
      )
      .await
      .unwrap();
    assert_eq!(result.data, Version { v: 1 });

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(
      matches!(event, CacheEvent::RefreshFailed { ref message, .. } if message.contains("connection reset"))
    );
    assert_eq!(loader.peek("k").unwrap().unwrap().payload, Version { v: 1 });
  }

  #[tokio::test]
  async fn test_miss_with_failing_fetch_propagates() {
    let loader = loader();
    let result = loader
      .load("k", || async { Err(eyre!("offline")) }, Duration::ZERO)
      .await;

    assert!(matches!(result, Err(Error::Network(ref m)) if m.contains("offline")));
    assert!(loader.peek("k").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let loader = loader();
    let result = loader
      .load("k", || async { Ok(Version { v: 7 }) }, Duration::from_secs(60))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(loader.peek("k").unwrap().unwrap().payload, Version { v: 7 });
  }

  #[tokio::test]
  async fn test_fresh_cache_skips_refresh() {
    let loader = loader();
    loader.put("k", Version { v: 1 }).unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let result = loader
      .load(
        "k",
        move || async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(Version { v: 2 })
        },
        Duration::from_secs(300),
      )
      .await
      .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(result.data, Version { v: 1 });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_fetched_at_is_monotonic() {
    let loader = loader();
    let mut last = loader.put("k", Version { v: 0 }).unwrap().fetched_at;
    for v in 1..50 {
      let entry = loader.put("k", Version { v }).unwrap();
      assert!(entry.fetched_at > last);
      last = entry.fetched_at;
    }
  }

  #[test]
  fn test_clear_only_touches_own_namespace() {
    let storage = Arc::new(MemoryStore::new());
    let devices: CacheAsideLoader<Version> = CacheAsideLoader::new(storage.clone(), "devices");
    let scenes: CacheAsideLoader<Version> = CacheAsideLoader::new(storage, "scenes");

    devices.put("a", Version { v: 1 }).unwrap();
    devices.put("b", Version { v: 1 }).unwrap();
    scenes.put("a", Version { v: 1 }).unwrap();

    assert_eq!(devices.clear().unwrap(), 2);
    assert!(devices.peek("a").unwrap().is_none());
    assert!(scenes.peek("a").unwrap().is_some());
  }

  #[test]
  fn test_entries_carry_trimmed_key() {
    let loader = loader();
    loader.put("  k \n", Version { v: 1 }).unwrap();
    let entry = loader.peek("k").unwrap().unwrap();
    assert_eq!(entry.key, "k");
  }

  /// Reads work, writes fail.
  #[derive(Default)]
  struct ReadOnlyStore {
    inner: MemoryStore,
  }

  impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
      self.inner.get(key)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(Error::Storage("disk full".to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
      self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
      self.inner.keys_with_prefix(prefix)
    }
  }

  #[tokio::test]
  async fn test_failed_write_still_advances_fetched_at() {
    let store = Arc::new(ReadOnlyStore::default());
    let ahead = CachedResource {
      key: "k".to_string(),
      payload: Version { v: 1 },
      fetched_at: Utc::now() + chrono::Duration::seconds(30),
      source: CacheSource::Network,
    };
    store
      .inner
      .set(
        &storage_key("test", "k"),
        &serde_json::to_string(&ahead).unwrap(),
      )
      .unwrap();
    let loader: CacheAsideLoader<Version> = CacheAsideLoader::new(store, "test");

    let entry = loader
      .refresh("k", || async { Ok(Version { v: 2 }) })
      .await
      .unwrap();
    assert_eq!(entry.payload, Version { v: 2 });
    assert!(entry.fetched_at > ahead.fetched_at);
    assert_eq!(loader.peek("k").unwrap().unwrap().payload, Version { v: 1 });
  }

  #[test]
  fn test_invalidate() {
    let loader = loader();
    loader.put("k", Version { v: 1 }).unwrap();
    loader.invalidate("k").unwrap();
    assert!(loader.peek("k").unwrap().is_none());
  }
}
