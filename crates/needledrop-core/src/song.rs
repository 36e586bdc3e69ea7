//! Song — identified by its (name, artist) pair, compared case-insensitively.

use std::{
  fmt,
  hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// A song. Identity is the (name, artist) pair with ASCII case folded, so
/// `Song::new("Sandstorm", "Darude")` and `Song::new("sandstorm", "darude")`
/// are the same entity. ASCII folding matches the `COLLATE NOCASE` collation
/// the store uses on both columns.
///
/// The original casing is preserved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
  pub name:   String,
  pub artist: String,
}

impl Song {
  pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
    Self {
      name:   name.into(),
      artist: artist.into(),
    }
  }
}

impl PartialEq for Song {
  fn eq(&self, other: &Self) -> bool {
    self.name.eq_ignore_ascii_case(&other.name)
      && self.artist.eq_ignore_ascii_case(&other.artist)
  }
}

impl Eq for Song {}

impl Hash for Song {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.to_ascii_lowercase().hash(state);
    self.artist.to_ascii_lowercase().hash(state);
  }
}

impl fmt::Display for Song {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"{}\" by {}", self.name, self.artist)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::Song;

  #[test]
  fn identity_is_case_insensitive() {
    assert_eq!(Song::new("Sandstorm", "Darude"), Song::new("sandstorm", "darude"));
    assert_ne!(Song::new("Sandstorm", "Darude"), Song::new("Sandstorm", "DaDude"));
  }

  #[test]
  fn hash_agrees_with_eq() {
    let mut set = HashSet::new();
    set.insert(Song::new("Goodbye", "AREZRA"));
    assert!(set.contains(&Song::new("GOODBYE", "arezra")));
  }
}
