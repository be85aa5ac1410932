//! Edit-distance gate for suppressing redundant expensive calls.
//!
//! Comparison is case-insensitive and runs in O(n·m), so inputs are capped
//! to their trailing `max_chars` characters before comparing.

pub const DEFAULT_THRESHOLD: f64 = 0.9;
pub const DEFAULT_MAX_CHARS: usize = 512;

/// Classic Levenshtein distance over chars (insert, delete, substitute cost 1),
/// ignoring case.
pub fn edit_distance(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.to_lowercase().chars().collect();
  let b: Vec<char> = b.to_lowercase().chars().collect();
  levenshtein(&a, &b)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
  if a.is_empty() {
    return b.len();
  }
  if b.is_empty() {
    return a.len();
  }

  // Two rolling rows of the DP table
  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut curr = vec![0; b.len() + 1];

  for (i, ca) in a.iter().enumerate() {
    curr[0] = i + 1;
    for (j, cb) in b.iter().enumerate() {
      let substitution = prev[j] + usize::from(ca != cb);
      let deletion = prev[j + 1] + 1;
      let insertion = curr[j] + 1;
      curr[j + 1] = substitution.min(deletion).min(insertion);
    }
    std::mem::swap(&mut prev, &mut curr);
  }

  prev[b.len()]
}

/// Normalized similarity in `[0, 1]`: `(max_len - distance) / max_len`.
///
/// Two empty strings are identical (1.0); empty against non-empty is 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
  let a: Vec<char> = a.to_lowercase().chars().collect();
  let b: Vec<char> = b.to_lowercase().chars().collect();
  ratio(&a, &b)
}

fn ratio(a: &[char], b: &[char]) -> f64 {
  let max_len = a.len().max(b.len());
  if max_len == 0 {
    return 1.0;
  }
  let distance = levenshtein(a, b);
  (max_len - distance) as f64 / max_len as f64
}

/// Decides whether new input differs enough from the last processed input
/// to justify another expensive call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityGate {
  threshold: f64,
  max_chars: usize,
}

impl Default for SimilarityGate {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      max_chars: DEFAULT_MAX_CHARS,
    }
  }
}

impl SimilarityGate {
  pub fn new(threshold: f64) -> Self {
    Self {
      threshold,
      ..Self::default()
    }
  }

  /// Compare at most the last `max_chars` characters of each input.
  pub fn with_max_chars(mut self, max_chars: usize) -> Self {
    self.max_chars = max_chars.max(1);
    self
  }

  pub fn threshold(&self) -> f64 {
    self.threshold
  }

  /// Similarity of the capped inputs.
  pub fn score(&self, current: &str, previous: &str) -> f64 {
    let current = self.tail(current);
    let previous = self.tail(previous);
    ratio(&current, &previous)
  }

  /// `false` when `current` is more than `threshold` similar to `previous`.
  pub fn should_proceed(&self, current: &str, previous: &str) -> bool {
    self.score(current, previous) <= self.threshold
  }

  fn tail(&self, input: &str) -> Vec<char> {
    let chars: Vec<char> = input.to_lowercase().chars().collect();
    let start = chars.len().saturating_sub(self.max_chars);
    chars[start..].to_vec()
  }
}

/// Gate check with an explicit threshold and the default input cap.
pub fn should_proceed(current: &str, previous: &str, threshold: f64) -> bool {
  SimilarityGate::new(threshold).should_proceed(current, previous)
}
