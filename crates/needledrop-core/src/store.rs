//! The `RecStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `needledrop-store-sqlite`). The command front end depends on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  recommendation::{Rating, RecKey, RecStatus, Recommendation},
  snowflake::{GuildId, ThreadId, UserId},
  song::Song,
  thread::Thread,
};

// ─── Query result types ──────────────────────────────────────────────────────

/// One row of an average/total leaderboard: a suggester together with their
/// aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry<T> {
  pub suggester: UserId,
  pub score:     T,
}

/// One row of an overlap query: the best rating each of the two users gave
/// the same song. `first` belongs to the first argument of
/// [`RecStore::overlap`], `second` to the second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapPair {
  pub first:  Recommendation,
  pub second: Recommendation,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Needledrop store backend.
///
/// Every mutating operation runs its existence checks and writes inside a
/// single transaction: either all of its statements commit or none do, and
/// readers never observe a partial write.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait RecStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Threads (turn state machine) ──────────────────────────────────────

  /// Persist a new thread, creating both participant user rows as needed.
  /// Fails if a thread with that id is already linked.
  fn create_thread(
    &self,
    thread: &Thread,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a thread by id. Returns `None` if not linked.
  fn get_thread(
    &self,
    id: ThreadId,
  ) -> impl Future<Output = Result<Option<Thread>, Self::Error>> + Send + '_;

  /// The sole turn transition: hand possession to `next` (defaulting to the
  /// participant not currently at bat), persist, and return the updated
  /// thread. Fails if the thread has been delinked or `next` is not a
  /// participant.
  fn flip_thread<'a>(
    &'a self,
    thread: &'a Thread,
    next: Option<UserId>,
  ) -> impl Future<Output = Result<Thread, Self::Error>> + Send + 'a;

  /// Remove the thread's linkage. Recommendation history is untouched.
  fn delink_thread(
    &self,
    id: ThreadId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Threads in which `user` is at bat, optionally scoped to one guild.
  fn waiting_threads(
    &self,
    user: UserId,
    guild: Option<GuildId>,
  ) -> impl Future<Output = Result<Vec<Thread>, Self::Error>> + Send + '_;

  /// The caller-level guard for [`create_open_rec`]: does an open
  /// recommendation already exist from the thread's suggester to its
  /// current turn holder?
  ///
  /// [`create_open_rec`]: Self::create_open_rec
  fn thread_has_open_rec<'a>(
    &'a self,
    thread: &'a Thread,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// The open recommendation awaiting the thread's turn holder, if any.
  fn open_rec_for_thread<'a>(
    &'a self,
    thread: &'a Thread,
  ) -> impl Future<Output = Result<Option<Recommendation>, Self::Error>> + Send + 'a;

  // ── Recommendation lifecycle ──────────────────────────────────────────

  /// Insert a new open recommendation, creating user and song rows as
  /// needed. Performs no caller-visible uniqueness check — callers consult
  /// [`thread_has_open_rec`] first — but the store's at-most-one-open
  /// constraint backstops the invariant and surfaces a conflict error
  /// rather than stacking open rows.
  ///
  /// [`thread_has_open_rec`]: Self::thread_has_open_rec
  fn create_open_rec<'a>(
    &'a self,
    key: &'a RecKey,
    suggested_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Recommendation, Self::Error>> + Send + 'a;

  /// Close the open recommendation matching `key` by recording its rating.
  /// Fails with a not-found error if no open row matches; never fabricates
  /// a row.
  fn close_rec<'a>(
    &'a self,
    key: &'a RecKey,
    rating: Rating,
  ) -> impl Future<Output = Result<Recommendation, Self::Error>> + Send + 'a;

  /// Out-of-band insert, bypassing thread flow. Fails with a conflict error
  /// if a **closed** row already exists for the identical key; the guild is
  /// part of that key.
  fn add_manual_rating<'a>(
    &'a self,
    key: &'a RecKey,
    suggested_at: DateTime<Utc>,
    status: RecStatus,
  ) -> impl Future<Output = Result<Recommendation, Self::Error>> + Send + 'a;

  /// Overwrite the rating of the unique closed recommendation matching
  /// (song, rater, suggester). Fails if no row matches, or — since the key
  /// is not unique across time — if more than one does.
  fn rerate<'a>(
    &'a self,
    song: &'a Song,
    rater: UserId,
    suggester: UserId,
    rating: Rating,
  ) -> impl Future<Output = Result<Recommendation, Self::Error>> + Send + 'a;

  /// Hard-delete the open recommendation matching `key` ("clear"). Only
  /// open rows are eligible, so a clear can never destroy closed history
  /// sharing the key.
  fn delete_open_rec<'a>(
    &'a self,
    key: &'a RecKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Rating analytics (closed rows only) ───────────────────────────────

  /// All rows sharing the maximum rating received by `suggester`,
  /// optionally restricted to one rater. A superlative may not be unique;
  /// ties yield multiple rows.
  fn max_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;

  /// Mean rating received by `suggester`. `None` when no closed rows match
  /// — distinct from a zero rating.
  fn average_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Option<f64>, Self::Error>> + Send + '_;

  /// Sum of ratings received by `suggester`, or `None` when no closed rows
  /// match.
  fn total_rating(
    &self,
    suggester: UserId,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + '_;

  /// One representative max-rated row per suggester, ordered by rating
  /// descending.
  fn leaderboard_max(
    &self,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;

  /// Per-suggester mean rating, ordered descending.
  fn leaderboard_average(
    &self,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Vec<LeaderboardEntry<f64>>, Self::Error>> + Send + '_;

  /// Per-suggester rating sum, ordered descending.
  fn leaderboard_total(
    &self,
    rater: Option<UserId>,
  ) -> impl Future<Output = Result<Vec<LeaderboardEntry<i64>>, Self::Error>> + Send + '_;

  /// For each song both users have closed-rated (regardless of suggester),
  /// pair the best rating each gave it. Tolerates either user having rated
  /// a song several times; only their max surfaces.
  fn overlap(
    &self,
    first: UserId,
    second: UserId,
  ) -> impl Future<Output = Result<Vec<OverlapPair>, Self::Error>> + Send + '_;

  // ── History scans ─────────────────────────────────────────────────────

  /// Rows suggested by `suggester`, either closed or open.
  fn ratings_by_suggester(
    &self,
    suggester: UserId,
    closed: bool,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;

  /// Rows rated (or awaiting rating) by `rater`, either closed or open.
  fn ratings_by_rater(
    &self,
    rater: UserId,
    closed: bool,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;

  /// All closed ratings of one song, across all pairs.
  fn ratings_by_song<'a>(
    &'a self,
    song: &'a Song,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + 'a;

  /// All closed ratings of one artist's songs (case-insensitive match).
  fn ratings_by_artist<'a>(
    &'a self,
    artist: &'a str,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + 'a;

  /// Everything the two users have closed-rated between themselves, in
  /// either direction, newest first.
  fn history_between(
    &self,
    a: UserId,
    b: UserId,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;

  // ── Diagnostics ───────────────────────────────────────────────────────

  /// Raw scan of the user table.
  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<UserId>, Self::Error>> + Send + '_;

  /// Raw scan of the song table.
  fn list_songs(
    &self,
  ) -> impl Future<Output = Result<Vec<Song>, Self::Error>> + Send + '_;

  /// Raw scan of the thread table.
  fn list_threads(
    &self,
  ) -> impl Future<Output = Result<Vec<Thread>, Self::Error>> + Send + '_;

  /// Raw scan of the recommendation table.
  fn list_recommendations(
    &self,
  ) -> impl Future<Output = Result<Vec<Recommendation>, Self::Error>> + Send + '_;
}
