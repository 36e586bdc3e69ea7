//! Encoding and decoding helpers between Rust domain types and the column
//! representations stored in SQLite.
//!
//! Timestamps are stored as RFC 3339 strings. The open/closed state is
//! stored as the `(rating, is_closed)` column pair: `(-1, 0)` for open,
//! `(r, 1)` for closed.

use chrono::{DateTime, Utc};
use needledrop_core::{
  recommendation::{Rating, RecStatus, Recommendation},
  snowflake::{GuildId, ThreadId, UserId},
  song::Song,
  thread::Thread,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── RecStatus ───────────────────────────────────────────────────────────────

/// The `(rating, is_closed)` column pair for a status.
pub fn encode_status(status: RecStatus) -> (i64, i64) {
  match status {
    RecStatus::Open => (-1, 0),
    RecStatus::Closed(r) => (i64::from(r), 1),
  }
}

pub fn decode_status(rating: i64, is_closed: i64) -> Result<RecStatus> {
  if is_closed == 0 {
    Ok(RecStatus::Open)
  } else {
    Ok(RecStatus::Closed(Rating::new(rating).map_err(Error::Core)?))
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every query that reads full recommendation rows.
pub const REC_COLUMNS: &str =
  "song_name, artist, rater_id, suggester_id, guild_id, timestamp, rating, is_closed";

/// Column list shared by every query that reads full thread rows.
pub const THREAD_COLUMNS: &str =
  "thread_id, guild_id, user1_id, user2_id, next_user";

/// Raw values read directly from a `recommendation` row.
pub struct RawRecommendation {
  pub song_name:    String,
  pub artist:       String,
  pub rater_id:     i64,
  pub suggester_id: i64,
  pub guild_id:     i64,
  pub timestamp:    String,
  pub rating:       i64,
  pub is_closed:    i64,
}

impl RawRecommendation {
  /// Read the columns of [`REC_COLUMNS`], in order, starting at index 0.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Self::from_row_at(row, 0)
  }

  /// As [`from_row`](Self::from_row), but starting at column index `at` —
  /// for queries that prefix the row with e.g. a rowid.
  pub fn from_row_at(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      song_name:    row.get(at)?,
      artist:       row.get(at + 1)?,
      rater_id:     row.get(at + 2)?,
      suggester_id: row.get(at + 3)?,
      guild_id:     row.get(at + 4)?,
      timestamp:    row.get(at + 5)?,
      rating:       row.get(at + 6)?,
      is_closed:    row.get(at + 7)?,
    })
  }

  pub fn into_recommendation(self) -> Result<Recommendation> {
    Ok(Recommendation {
      song:         Song::new(self.song_name, self.artist),
      rater:        UserId(self.rater_id),
      suggester:    UserId(self.suggester_id),
      guild:        GuildId(self.guild_id),
      suggested_at: decode_dt(&self.timestamp)?,
      status:       decode_status(self.rating, self.is_closed)?,
    })
  }
}

/// Raw values read directly from a `thread` row.
pub struct RawThread {
  pub thread_id: i64,
  pub guild_id:  i64,
  pub user1_id:  i64,
  pub user2_id:  i64,
  pub next_user: i64,
}

impl RawThread {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      thread_id: row.get(0)?,
      guild_id:  row.get(1)?,
      user1_id:  row.get(2)?,
      user2_id:  row.get(3)?,
      next_user: row.get(4)?,
    })
  }

  pub fn into_thread(self) -> Result<Thread> {
    // The schema CHECK keeps next_user inside the pair; with_next re-checks
    // on the way out.
    Ok(Thread::with_next(
      ThreadId(self.thread_id),
      GuildId(self.guild_id),
      UserId(self.user1_id),
      UserId(self.user2_id),
      UserId(self.next_user),
    )?)
  }
}
