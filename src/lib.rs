//! Local-first synchronization layer: a persisted, rehydratable store,
//! cache-aside resource loading and debounced, similarity-gated effects.

pub mod app;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod editor;
pub mod error;
pub mod logging;
pub mod remote;
pub mod similarity;
pub mod slice;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
