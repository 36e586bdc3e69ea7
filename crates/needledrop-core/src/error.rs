//! Error types for `needledrop-core`.

use thiserror::Error;

use crate::snowflake::{ThreadId, UserId};

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────

  #[error("no exchange thread is linked to channel {0}")]
  ThreadNotFound(ThreadId),

  #[error("no open recommendation matches the given song and pair")]
  OpenRecNotFound,

  #[error("no closed recommendation matches the given song and pair")]
  ClosedRecNotFound,

  // ── Conflicts ─────────────────────────────────────────────────────────

  #[error("thread {0} is already linked")]
  ThreadExists(ThreadId),

  #[error("an open recommendation already exists between this pair")]
  OpenRecExists,

  #[error("a closed rating already exists for this song and pair")]
  RatingExists,

  // ── Ambiguity ─────────────────────────────────────────────────────────

  /// Rerate matched more than one closed row in the rating history. We fail
  /// closed rather than guess which one the caller meant.
  #[error("{0} closed recommendations match; rerate requires exactly one")]
  AmbiguousRerate(usize),

  // ── Forbidden ─────────────────────────────────────────────────────────

  #[error("user {0} is not a member of this thread")]
  NotAMember(UserId),

  #[error("it is not user {0}'s turn to make or rate a recommendation")]
  NotYourTurn(UserId),

  #[error("user {0} has no pending recommendation to clear")]
  NothingPendingFromYou(UserId),

  // ── Validation ────────────────────────────────────────────────────────

  #[error("rating {0} is out of range; ratings run 1 through 10")]
  RatingOutOfRange(i64),

  #[error("user {user} cannot hold the turn in thread {thread}: not a participant")]
  NextUserNotMember { thread: ThreadId, user: UserId },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
