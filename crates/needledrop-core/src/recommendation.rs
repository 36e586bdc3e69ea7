//! Recommendation — the fact that one user suggested a song to another, and
//! (once closed) the rating it received.
//!
//! A recommendation's lookup identity is the tuple (song, rater, suggester,
//! guild). That tuple is NOT unique across time: the same pair of users can
//! rate the same song more than once, and only the timestamp and closed state
//! tell the rows apart. Operations that must pick a single historical row
//! (rerate) fail on ambiguity rather than guessing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  error::{Error, Result},
  snowflake::{GuildId, UserId},
  song::Song,
};

// ─── Rating ──────────────────────────────────────────────────────────────────

/// A rating in `[1, 10]`. The storage sentinel `-1` for open recommendations
/// never appears in this type; open state is [`RecStatus::Open`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
  pub const MAX: u8 = 10;
  pub const MIN: u8 = 1;

  pub fn new(value: i64) -> Result<Self> {
    if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
      Ok(Self(value as u8))
    } else {
      Err(Error::RatingOutOfRange(value))
    }
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for Rating {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> { Self::new(value) }
}

impl From<Rating> for i64 {
  fn from(rating: Rating) -> Self { rating.0 as i64 }
}

impl std::fmt::Display for Rating {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Whether a recommendation is still awaiting its rating.
///
/// A closed recommendation always carries a valid rating; an open one carries
/// none. The store maps `Open` to `(rating = -1, is_closed = 0)` and
/// `Closed(r)` to `(rating = r, is_closed = 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "rating", rename_all = "lowercase")]
pub enum RecStatus {
  Open,
  Closed(Rating),
}

impl RecStatus {
  pub fn is_closed(&self) -> bool { matches!(self, Self::Closed(_)) }

  pub fn rating(&self) -> Option<Rating> {
    match self {
      Self::Open => None,
      Self::Closed(r) => Some(*r),
    }
  }
}

// ─── Key & row ───────────────────────────────────────────────────────────────

/// The lookup identity of a recommendation. See the module docs for why this
/// is a quasi-key rather than a true unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecKey {
  pub song:      Song,
  pub rater:     UserId,
  pub suggester: UserId,
  pub guild:     GuildId,
}

/// A full recommendation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
  pub song:         Song,
  /// Who rates (or rated) the song.
  pub rater:        UserId,
  /// Who proposed it.
  pub suggester:    UserId,
  pub guild:        GuildId,
  pub suggested_at: DateTime<Utc>,
  pub status:       RecStatus,
}

impl Recommendation {
  /// Project the lookup key for close/delete/conflict checks.
  pub fn key(&self) -> RecKey {
    RecKey {
      song:      self.song.clone(),
      rater:     self.rater,
      suggester: self.suggester,
      guild:     self.guild,
    }
  }

  pub fn is_closed(&self) -> bool { self.status.is_closed() }

  pub fn rating(&self) -> Option<Rating> { self.status.rating() }
}
