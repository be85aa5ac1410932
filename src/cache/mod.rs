//! Cache-aside loading for data persistence and offline support.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Serves cached data immediately so the UI can render without waiting
//! - Refreshes stale entries from the network in the background
//! - Keeps serving the cached value when the network is unavailable
//! - Surfaces a failure only when there is nothing cached to fall back on

mod key;
mod layer;
mod traits;

pub use layer::{CacheAsideLoader, RefreshHandle};
pub use traits::{CacheEvent, CacheSource, CachedResource, Cacheable, Loaded};
