//! [`SqliteStore`] — the SQLite implementation of [`RecStore`].

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};
use needledrop_core::{
  Error as CoreError,
  recommendation::{Rating, RecKey, RecStatus, Recommendation},
  snowflake::{GuildId, ThreadId, UserId},
  song::Song,
  store::{LeaderboardEntry, OverlapPair, RecStore},
  thread::Thread,
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{
    RawRecommendation, RawThread, REC_COLUMNS, THREAD_COLUMNS, decode_dt,
    encode_dt, encode_status,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Needledrop store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All access
/// goes through one connection on a dedicated thread, so logical operations
/// are serialized without any in-process locking of our own.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `sql` (which must select [`REC_COLUMNS`]) and decode every row.
  async fn collect_recs(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<Recommendation>> {
    let raws: Vec<RawRecommendation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params_from_iter(params),
            RawRecommendation::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawRecommendation::into_recommendation)
      .collect()
  }
}

// ─── SQL helpers ─────────────────────────────────────────────────────────────

/// Create-if-absent referential targets; upserts keep the FK constraints
/// satisfied without read-before-write round trips.
fn ensure_user(tx: &rusqlite::Transaction<'_>, user: UserId) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT OR IGNORE INTO user (discord_id) VALUES (?1)",
    rusqlite::params![user.0],
  )?;
  Ok(())
}

/// `INSERT OR IGNORE` respects the NOCASE primary key, so a differently
/// cased duplicate of an existing song is a no-op.
fn ensure_song(
  tx: &rusqlite::Transaction<'_>,
  name: &str,
  artist: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT OR IGNORE INTO song (song_name, artist) VALUES (?1, ?2)",
    rusqlite::params![name, artist],
  )?;
  Ok(())
}

/// True when the error is SQLite rejecting a write over a constraint —
/// here, that means the partial unique index guarding at-most-one-open.
fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
  matches!(
    err,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── RecStore impl ───────────────────────────────────────────────────────────

impl RecStore for SqliteStore {
  type Error = Error;

  // ── Threads (turn state machine) ──────────────────────────────────────────

  fn create_thread(
    &self,
    thread: &Thread,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    let t = thread.clone();
    let (thread_id, user1, user2) = (t.thread_id, t.user1, t.user2);

    async move {
    let out: std::result::Result<(), CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM thread WHERE thread_id = ?1",
            rusqlite::params![t.thread_id.0],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(Err(CoreError::ThreadExists(t.thread_id)));
        }

        ensure_user(&tx, t.user1)?;
        ensure_user(&tx, t.user2)?;
        tx.execute(
          "INSERT INTO thread (thread_id, guild_id, user1_id, user2_id, next_user)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            t.thread_id.0,
            t.guild.0,
            t.user1.0,
            t.user2.0,
            t.next_user().0,
          ],
        )?;

        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    out.map_err(Error::Core)?;

    tracing::info!(
      thread = %thread_id,
      user1 = %user1,
      user2 = %user2,
      "thread linked"
    );
    Ok(())
    }
  }

  async fn get_thread(&self, id: ThreadId) -> Result<Option<Thread>> {
    let raw: Option<RawThread> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {THREAD_COLUMNS} FROM thread WHERE thread_id = ?1"),
              rusqlite::params![id.0],
              RawThread::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawThread::into_thread).transpose()
  }

  async fn flip_thread(
    &self,
    thread: &Thread,
    next: Option<UserId>,
  ) -> Result<Thread> {
    // Validates that the target is a participant before touching the store.
    let flipped = thread.flipped(next).map_err(Error::Core)?;

    let id = thread.thread_id;
    let next_id = flipped.next_user().0;
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE thread SET next_user = ?1 WHERE thread_id = ?2",
          rusqlite::params![next_id, id.0],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::Core(CoreError::ThreadNotFound(id)));
    }

    tracing::debug!(thread = %id, next_user = %flipped.next_user(), "turn flipped");
    Ok(flipped)
  }

  async fn delink_thread(&self, id: ThreadId) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM thread WHERE thread_id = ?1",
          rusqlite::params![id.0],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::Core(CoreError::ThreadNotFound(id)));
    }

    tracing::info!(thread = %id, "thread delinked");
    Ok(())
  }

  async fn waiting_threads(
    &self,
    user: UserId,
    guild: Option<GuildId>,
  ) -> Result<Vec<Thread>> {
    let raws: Vec<RawThread> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(g) = guild {
          let mut stmt = conn.prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread
             WHERE next_user = ?1 AND guild_id = ?2"
          ))?;
          stmt
            .query_map(rusqlite::params![user.0, g.0], RawThread::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread WHERE next_user = ?1"
          ))?;
          stmt
            .query_map(rusqlite::params![user.0], RawThread::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawThread::into_thread).collect()
  }

  async fn thread_has_open_rec(&self, thread: &Thread) -> Result<bool> {
    let rater = thread.next_user().0;
    let suggester = thread.other_user().0;

    let found: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM recommendation
               WHERE rater_id = ?1 AND suggester_id = ?2 AND is_closed = 0
               LIMIT 1",
              rusqlite::params![rater, suggester],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }

  async fn open_rec_for_thread(
    &self,
    thread: &Thread,
  ) -> Result<Option<Recommendation>> {
    let rater = thread.next_user().0;
    let suggester = thread.other_user().0;

    let raw: Option<RawRecommendation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {REC_COLUMNS} FROM recommendation
                 WHERE rater_id = ?1 AND suggester_id = ?2 AND is_closed = 0"
              ),
              rusqlite::params![rater, suggester],
              RawRecommendation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecommendation::into_recommendation).transpose()
  }

  // ── Recommendation lifecycle ──────────────────────────────────────────────

  async fn create_open_rec(
    &self,
    key: &RecKey,
    suggested_at: DateTime<Utc>,
  ) -> Result<Recommendation> {
    let k = key.clone();
    let at = encode_dt(suggested_at);

    let res = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        ensure_user(&tx, k.rater)?;
        ensure_user(&tx, k.suggester)?;
        ensure_song(&tx, &k.song.name, &k.song.artist)?;
        tx.execute(
          "INSERT INTO recommendation
             (song_name, artist, rater_id, suggester_id, guild_id, timestamp, rating, is_closed)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, -1, 0)",
          rusqlite::params![
            k.song.name,
            k.song.artist,
            k.rater.0,
            k.suggester.0,
            k.guild.0,
            at,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => {
        tracing::info!(
          song = %key.song,
          rater = %key.rater,
          suggester = %key.suggester,
          "recommendation opened"
        );
        Ok(Recommendation {
          song: key.song.clone(),
          rater: key.rater,
          suggester: key.suggester,
          guild: key.guild,
          suggested_at,
          status: RecStatus::Open,
        })
      }
      Err(e) if is_constraint_violation(&e) => {
        Err(Error::Core(CoreError::OpenRecExists))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn close_rec(&self, key: &RecKey, rating: Rating) -> Result<Recommendation> {
    let k = key.clone();
    let rating_i = i64::from(rating);

    let out: std::result::Result<RawRecommendation, CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let rowid: Option<i64> = tx
          .query_row(
            "SELECT rowid FROM recommendation
             WHERE song_name = ?1 AND artist = ?2 AND rater_id = ?3
               AND suggester_id = ?4 AND guild_id = ?5 AND is_closed = 0",
            rusqlite::params![
              k.song.name,
              k.song.artist,
              k.rater.0,
              k.suggester.0,
              k.guild.0,
            ],
            |row| row.get(0),
          )
          .optional()?;
        let Some(rowid) = rowid else {
          return Ok(Err(CoreError::OpenRecNotFound));
        };

        tx.execute(
          "UPDATE recommendation SET rating = ?1, is_closed = 1 WHERE rowid = ?2",
          rusqlite::params![rating_i, rowid],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {REC_COLUMNS} FROM recommendation WHERE rowid = ?1"),
          rusqlite::params![rowid],
          RawRecommendation::from_row,
        )?;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    let rec = out.map_err(Error::Core)?.into_recommendation()?;
    tracing::info!(
      song = %rec.song,
      rater = %rec.rater,
      rating = %rating,
      "recommendation closed"
    );
    Ok(rec)
  }

  async fn add_manual_rating(
    &self,
    key: &RecKey,
    suggested_at: DateTime<Utc>,
    status: RecStatus,
  ) -> Result<Recommendation> {
    let k = key.clone();
    let at = encode_dt(suggested_at);
    let (rating_col, closed_col) = encode_status(status);

    let res = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        ensure_user(&tx, k.rater)?;
        ensure_user(&tx, k.suggester)?;
        ensure_song(&tx, &k.song.name, &k.song.artist)?;

        let dup: bool = tx
          .query_row(
            "SELECT 1 FROM recommendation
             WHERE song_name = ?1 AND artist = ?2 AND rater_id = ?3
               AND suggester_id = ?4 AND guild_id = ?5 AND is_closed = 1
             LIMIT 1",
            rusqlite::params![
              k.song.name,
              k.song.artist,
              k.rater.0,
              k.suggester.0,
              k.guild.0,
            ],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if dup {
          return Ok(Err(CoreError::RatingExists));
        }

        tx.execute(
          "INSERT INTO recommendation
             (song_name, artist, rater_id, suggester_id, guild_id, timestamp, rating, is_closed)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            k.song.name,
            k.song.artist,
            k.rater.0,
            k.suggester.0,
            k.guild.0,
            at,
            rating_col,
            closed_col,
          ],
        )?;

        tx.commit()?;
        Ok(Ok(()))
      })
      .await;

    match res {
      Ok(inner) => {
        inner.map_err(Error::Core)?;
        tracing::info!(
          song = %key.song,
          rater = %key.rater,
          suggester = %key.suggester,
          closed = status.is_closed(),
          "manual rating recorded"
        );
        Ok(Recommendation {
          song: key.song.clone(),
          rater: key.rater,
          suggester: key.suggester,
          guild: key.guild,
          suggested_at,
          status,
        })
      }
      Err(e) if is_constraint_violation(&e) => {
        Err(Error::Core(CoreError::OpenRecExists))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn rerate(
    &self,
    song: &Song,
    rater: UserId,
    suggester: UserId,
    rating: Rating,
  ) -> Result<Recommendation> {
    let name = song.name.clone();
    let artist = song.artist.clone();
    let rating_i = i64::from(rating);

    let out: std::result::Result<RawRecommendation, CoreError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut stmt = tx.prepare(&format!(
          "SELECT rowid, {REC_COLUMNS} FROM recommendation
           WHERE song_name = ?1 AND artist = ?2 AND is_closed = 1
             AND rater_id = ?3 AND suggester_id = ?4"
        ))?;
        let matches = stmt
          .query_map(
            rusqlite::params![name, artist, rater.0, suggester.0],
            |row| {
              Ok((row.get::<_, i64>(0)?, RawRecommendation::from_row_at(row, 1)?))
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        // The key is not unique across history; refuse to guess which row
        // the caller meant.
        if matches.len() > 1 {
          return Ok(Err(CoreError::AmbiguousRerate(matches.len())));
        }
        let Some((rowid, mut raw)) = matches.into_iter().next() else {
          return Ok(Err(CoreError::ClosedRecNotFound));
        };

        tx.execute(
          "UPDATE recommendation SET rating = ?1 WHERE rowid = ?2",
          rusqlite::params![rating_i, rowid],
        )?;
        raw.rating = rating_i;

        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    let rec = out.map_err(Error::Core)?.into_recommendation()?;
    tracing::info!(song = %rec.song, rater = %rec.rater, rating = %rating, "rerated");
    Ok(rec)
  }

  async fn delete_open_rec(&self, key: &RecKey) -> Result<()> {
    let k = key.clone();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM recommendation
           WHERE song_name = ?1 AND artist = ?2 AND rater_id = ?3
             AND suggester_id = ?4 AND guild_id = ?5 AND is_closed = 0",
          rusqlite::params![
            k.song.name,
            k.song.artist,
            k.rater.0,
            k.suggester.0,
            k.guild.0,
          ],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::Core(CoreError::OpenRecNotFound));
    }

    tracing::info!(song = %key.song, rater = %key.rater, "open recommendation cleared");
    Ok(())
  }

  // ── Rating analytics ──────────────────────────────────────────────────────

  async fn max_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> Result<Vec<Recommendation>> {
    let (sql, params) = match rater {
      Some(r) => (
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE suggester_id = ?1 AND rater_id = ?2 AND is_closed = 1
             AND rating = (
               SELECT MAX(rating) FROM recommendation
               WHERE suggester_id = ?1 AND rater_id = ?2 AND is_closed = 1
             )"
        ),
        vec![suggester.0.into(), r.0.into()],
      ),
      None => (
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE suggester_id = ?1 AND is_closed = 1
             AND rating = (
               SELECT MAX(rating) FROM recommendation
               WHERE suggester_id = ?1 AND is_closed = 1
             )"
        ),
        vec![suggester.0.into()],
      ),
    };
    self.collect_recs(sql, params).await
  }

  async fn average_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> Result<Option<f64>> {
    let avg: Option<f64> = self
      .conn
      .call(move |conn| {
        let avg = if let Some(r) = rater {
          conn.query_row(
            "SELECT AVG(rating) FROM recommendation
             WHERE suggester_id = ?1 AND rater_id = ?2 AND is_closed = 1",
            rusqlite::params![suggester.0, r.0],
            |row| row.get(0),
          )?
        } else {
          conn.query_row(
            "SELECT AVG(rating) FROM recommendation
             WHERE suggester_id = ?1 AND is_closed = 1",
            rusqlite::params![suggester.0],
            |row| row.get(0),
          )?
        };
        Ok(avg)
      })
      .await?;
    Ok(avg)
  }

  async fn total_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> Result<Option<i64>> {
    let total: Option<i64> = self
      .conn
      .call(move |conn| {
        let total = if let Some(r) = rater {
          conn.query_row(
            "SELECT SUM(rating) FROM recommendation
             WHERE suggester_id = ?1 AND rater_id = ?2 AND is_closed = 1",
            rusqlite::params![suggester.0, r.0],
            |row| row.get(0),
          )?
        } else {
          conn.query_row(
            "SELECT SUM(rating) FROM recommendation
             WHERE suggester_id = ?1 AND is_closed = 1",
            rusqlite::params![suggester.0],
            |row| row.get(0),
          )?
        };
        Ok(total)
      })
      .await?;
    Ok(total)
  }

  async fn leaderboard_max(
    &self,
    rater: Option<UserId>,
  ) -> Result<Vec<Recommendation>> {
    // Bare columns alongside MAX() resolve to the max-rated row in SQLite,
    // so each suggester is represented by one of their best-received picks.
    let (sql, params) = match rater {
      Some(r) => (
        "SELECT song_name, artist, rater_id, suggester_id, guild_id,
                timestamp, MAX(rating) AS rating, is_closed
         FROM recommendation
         WHERE is_closed = 1 AND rater_id = ?1
         GROUP BY suggester_id
         ORDER BY rating DESC"
          .to_owned(),
        vec![r.0.into()],
      ),
      None => (
        "SELECT song_name, artist, rater_id, suggester_id, guild_id,
                timestamp, MAX(rating) AS rating, is_closed
         FROM recommendation
         WHERE is_closed = 1
         GROUP BY suggester_id
         ORDER BY rating DESC"
          .to_owned(),
        vec![],
      ),
    };
    self.collect_recs(sql, params).await
  }

  async fn leaderboard_average(
    &self,
    rater: Option<UserId>,
  ) -> Result<Vec<LeaderboardEntry<f64>>> {
    let rows: Vec<(i64, f64)> = self
      .conn
      .call(move |conn| {
        let sql_all = "SELECT suggester_id, AVG(rating) AS avg_rating
                       FROM recommendation
                       WHERE is_closed = 1
                       GROUP BY suggester_id
                       ORDER BY avg_rating DESC";
        let sql_one = "SELECT suggester_id, AVG(rating) AS avg_rating
                       FROM recommendation
                       WHERE is_closed = 1 AND rater_id = ?1
                       GROUP BY suggester_id
                       ORDER BY avg_rating DESC";
        let rows = if let Some(r) = rater {
          let mut stmt = conn.prepare(sql_one)?;
          stmt
            .query_map(rusqlite::params![r.0], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(sql_all)?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(id, score)| LeaderboardEntry { suggester: UserId(id), score })
        .collect(),
    )
  }

  async fn leaderboard_total(
    &self,
    rater: Option<UserId>,
  ) -> Result<Vec<LeaderboardEntry<i64>>> {
    let rows: Vec<(i64, i64)> = self
      .conn
      .call(move |conn| {
        let sql_all = "SELECT suggester_id, SUM(rating) AS total_rating
                       FROM recommendation
                       WHERE is_closed = 1
                       GROUP BY suggester_id
                       ORDER BY total_rating DESC";
        let sql_one = "SELECT suggester_id, SUM(rating) AS total_rating
                       FROM recommendation
                       WHERE is_closed = 1 AND rater_id = ?1
                       GROUP BY suggester_id
                       ORDER BY total_rating DESC";
        let rows = if let Some(r) = rater {
          let mut stmt = conn.prepare(sql_one)?;
          stmt
            .query_map(rusqlite::params![r.0], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(sql_all)?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(id, score)| LeaderboardEntry { suggester: UserId(id), score })
        .collect(),
    )
  }

  async fn overlap(&self, first: UserId, second: UserId) -> Result<Vec<OverlapPair>> {
    struct RawOverlap {
      song_name:   String,
      artist:      String,
      guild_id:    i64,
      a_suggester: i64,
      a_timestamp: String,
      a_rating:    i64,
      b_suggester: i64,
      b_timestamp: String,
      b_rating:    i64,
    }

    let raws: Vec<RawOverlap> = self
      .conn
      .call(move |conn| {
        // Per side: the best rating each user gave a song, one row per song.
        // The inner join on the NOCASE song columns pairs the sides up.
        let mut stmt = conn.prepare(
          "SELECT a.song_name, a.artist, a.guild_id,
                  a.suggester_id, a.timestamp, a.rating_a,
                  b.suggester_id, b.timestamp, b.rating_b
           FROM (
             SELECT MAX(rating) AS rating_a, song_name, artist, timestamp,
                    rater_id, suggester_id, guild_id
             FROM recommendation
             WHERE rater_id = ?1 AND is_closed = 1
             GROUP BY song_name, artist
           ) a
           INNER JOIN (
             SELECT MAX(rating) AS rating_b, song_name, artist, timestamp,
                    rater_id, suggester_id
             FROM recommendation
             WHERE rater_id = ?2 AND is_closed = 1
             GROUP BY song_name, artist
           ) b
           ON a.song_name = b.song_name AND a.artist = b.artist",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![first.0, second.0], |row| {
            Ok(RawOverlap {
              song_name:   row.get(0)?,
              artist:      row.get(1)?,
              guild_id:    row.get(2)?,
              a_suggester: row.get(3)?,
              a_timestamp: row.get(4)?,
              a_rating:    row.get(5)?,
              b_suggester: row.get(6)?,
              b_timestamp: row.get(7)?,
              b_rating:    row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let song = Song::new(raw.song_name, raw.artist);
        let guild = GuildId(raw.guild_id);
        Ok(OverlapPair {
          first:  Recommendation {
            song: song.clone(),
            rater: first,
            suggester: UserId(raw.a_suggester),
            guild,
            suggested_at: decode_dt(&raw.a_timestamp)?,
            status: RecStatus::Closed(
              Rating::new(raw.a_rating).map_err(Error::Core)?,
            ),
          },
          second: Recommendation {
            song,
            rater: second,
            suggester: UserId(raw.b_suggester),
            guild,
            suggested_at: decode_dt(&raw.b_timestamp)?,
            status: RecStatus::Closed(
              Rating::new(raw.b_rating).map_err(Error::Core)?,
            ),
          },
        })
      })
      .collect()
  }

  // ── History scans ─────────────────────────────────────────────────────────

  async fn ratings_by_suggester(
    &self,
    suggester: UserId,
    closed: bool,
  ) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE suggester_id = ?1 AND is_closed = ?2"
        ),
        vec![suggester.0.into(), (closed as i64).into()],
      )
      .await
  }

  async fn ratings_by_rater(
    &self,
    rater: UserId,
    closed: bool,
  ) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE rater_id = ?1 AND is_closed = ?2"
        ),
        vec![rater.0.into(), (closed as i64).into()],
      )
      .await
  }

  async fn ratings_by_song(&self, song: &Song) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE song_name = ?1 AND artist = ?2 AND is_closed = 1"
        ),
        vec![song.name.clone().into(), song.artist.clone().into()],
      )
      .await
  }

  async fn ratings_by_artist(&self, artist: &str) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE artist = ?1 AND is_closed = 1"
        ),
        vec![artist.to_owned().into()],
      )
      .await
  }

  async fn history_between(&self, a: UserId, b: UserId) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!(
          "SELECT {REC_COLUMNS} FROM recommendation
           WHERE rater_id IN (?1, ?2) AND suggester_id IN (?1, ?2)
             AND is_closed = 1
           ORDER BY timestamp DESC"
        ),
        vec![a.0.into(), b.0.into()],
      )
      .await
  }

  // ── Diagnostics ───────────────────────────────────────────────────────────

  async fn list_users(&self) -> Result<Vec<UserId>> {
    let ids: Vec<i64> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT discord_id FROM user")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ids.into_iter().map(UserId).collect())
  }

  async fn list_songs(&self) -> Result<Vec<Song>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT song_name, artist FROM song")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(
      rows
        .into_iter()
        .map(|(name, artist)| Song::new(name, artist))
        .collect(),
    )
  }

  async fn list_threads(&self) -> Result<Vec<Thread>> {
    let raws: Vec<RawThread> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {THREAD_COLUMNS} FROM thread"))?;
        let rows = stmt
          .query_map([], RawThread::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawThread::into_thread).collect()
  }

  async fn list_recommendations(&self) -> Result<Vec<Recommendation>> {
    self
      .collect_recs(
        format!("SELECT {REC_COLUMNS} FROM recommendation"),
        vec![],
      )
      .await
  }
}
