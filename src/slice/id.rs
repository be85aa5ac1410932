//! Time-derived entity ids.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_ISSUED: AtomicI64 = AtomicI64::new(0);

/// Generate a new entity id from the current time in milliseconds.
///
/// Ids are strictly increasing within a process: two calls in the same
/// millisecond get consecutive values instead of colliding.
pub fn next_id() -> String {
  let now = Utc::now().timestamp_millis();
  let previous = LAST_ISSUED
    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
      Some(now.max(last + 1))
    })
    .unwrap_or(now);
  now.max(previous + 1).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ids_are_unique_and_increasing() {
    let ids: Vec<i64> = (0..1000)
      .map(|_| next_id().parse::<i64>().unwrap())
      .collect();

    for pair in ids.windows(2) {
      assert!(pair[1] > pair[0]);
    }
  }

  #[test]
  fn test_id_tracks_clock() {
    let before = Utc::now().timestamp_millis();
    let id: i64 = next_id().parse().unwrap();
    assert!(id >= before);
  }
}
