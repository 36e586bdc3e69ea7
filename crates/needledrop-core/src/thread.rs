//! Thread — a persistent two-party exchange with an alternating turn holder.
//!
//! Exactly one of the two participants is "at bat" at any time, encoded by
//! the `next_user` field; there is no separate state enum because the two
//! participants are fixed for the life of the thread. The sole transition is
//! the flip, which hands the turn to the other participant.

use serde::{Deserialize, Serialize};

use crate::{
  error::{Error, Result},
  snowflake::{GuildId, ThreadId, UserId},
};

/// A two-party exchange thread.
///
/// Invariant: `next_user` is always one of `user1`/`user2`. Both constructors
/// uphold it, the field is private so it cannot be broken afterwards, and
/// deserialization re-checks it via [`ThreadRepr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ThreadRepr")]
pub struct Thread {
  pub thread_id: ThreadId,
  pub guild:     GuildId,
  pub user1:     UserId,
  pub user2:     UserId,
  next_user:     UserId,
}

/// The unvalidated wire shape of a [`Thread`]. Conversion goes through
/// [`Thread::with_next`] so a payload cannot smuggle in a turn holder who
/// is not a participant.
#[derive(Deserialize)]
struct ThreadRepr {
  thread_id: ThreadId,
  guild:     GuildId,
  user1:     UserId,
  user2:     UserId,
  next_user: UserId,
}

impl TryFrom<ThreadRepr> for Thread {
  type Error = Error;

  fn try_from(repr: ThreadRepr) -> Result<Self> {
    Self::with_next(repr.thread_id, repr.guild, repr.user1, repr.user2, repr.next_user)
  }
}

impl Thread {
  /// A freshly created thread: the creator (`user1`) starts at bat.
  pub fn new(
    thread_id: ThreadId,
    guild: GuildId,
    user1: UserId,
    user2: UserId,
  ) -> Self {
    Self { thread_id, guild, user1, user2, next_user: user1 }
  }

  /// Reconstruct a thread with an explicit turn holder (e.g. from a stored
  /// row). Fails if `next_user` is not a participant.
  pub fn with_next(
    thread_id: ThreadId,
    guild: GuildId,
    user1: UserId,
    user2: UserId,
    next_user: UserId,
  ) -> Result<Self> {
    if next_user != user1 && next_user != user2 {
      return Err(Error::NextUserNotMember { thread: thread_id, user: next_user });
    }
    Ok(Self { thread_id, guild, user1, user2, next_user })
  }

  /// The participant currently at bat.
  pub fn next_user(&self) -> UserId { self.next_user }

  /// The participant who is *not* at bat.
  pub fn other_user(&self) -> UserId {
    if self.next_user == self.user2 {
      self.user1
    } else {
      self.user2
    }
  }

  pub fn is_member(&self, user: UserId) -> bool {
    user == self.user1 || user == self.user2
  }

  pub fn is_at_bat(&self, user: UserId) -> bool { user == self.next_user }

  /// The turn transition: hand possession to `next`, defaulting to the
  /// participant who does not currently hold it. Applied twice with the
  /// default target, this is the identity.
  pub fn flipped(&self, next: Option<UserId>) -> Result<Self> {
    let next = next.unwrap_or_else(|| self.other_user());
    Self::with_next(self.thread_id, self.guild, self.user1, self.user2, next)
  }

  // ── Access-control predicates ─────────────────────────────────────────

  /// Gate for recommend/rate: the caller must be a member and must hold the
  /// turn.
  pub fn authorize_turn(&self, caller: UserId) -> Result<()> {
    if !self.is_member(caller) {
      return Err(Error::NotAMember(caller));
    }
    if !self.is_at_bat(caller) {
      return Err(Error::NotYourTurn(caller));
    }
    Ok(())
  }

  /// Gate for clear: the mirror image of [`authorize_turn`]. Only the
  /// *non*-turn-holder — the suggester whose pick is awaiting a rating — may
  /// withdraw it.
  ///
  /// [`authorize_turn`]: Self::authorize_turn
  pub fn authorize_clear(&self, caller: UserId) -> Result<()> {
    if !self.is_member(caller) {
      return Err(Error::NotAMember(caller));
    }
    if self.is_at_bat(caller) {
      return Err(Error::NothingPendingFromYou(caller));
    }
    Ok(())
  }
}
