//! Storage key derivation for cached resources.

use sha2::{Digest, Sha256};

const CACHE_PREFIX: &str = "cache";

/// Prefix shared by every entry of one namespace.
pub fn namespace_prefix(namespace: &str) -> String {
  format!("{}:{}:", CACHE_PREFIX, namespace)
}

/// Stable, fixed-length storage key for a resource key.
pub fn storage_key(namespace: &str, key: &str) -> String {
  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(normalize(key).as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{}{}", namespace_prefix(namespace), digest)
}

/// Trim surrounding whitespace so "devices " and "devices" share an entry.
pub fn normalize(key: &str) -> &str {
  key.trim()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_storage_key_is_namespaced_and_stable() {
    let a = storage_key("devices", "home:1");
    assert!(a.starts_with("cache:devices:"));
    assert_eq!(a.len(), "cache:devices:".len() + 64);
    assert_eq!(a, storage_key("devices", " home:1 "));
    assert_ne!(a, storage_key("scenes", "home:1"));
    assert_ne!(a, storage_key("devices", "home:2"));
  }

  #[test]
  fn test_normalize_trims() {
    assert_eq!(normalize("  home:1\n"), "home:1");
  }
}
