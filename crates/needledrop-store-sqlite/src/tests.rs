//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::Utc;
use needledrop_core::{
  Error as CoreError,
  recommendation::{Rating, RecKey, RecStatus},
  snowflake::{GuildId, ThreadId, UserId},
  song::Song,
  store::RecStore,
  thread::Thread,
};

use crate::{Error, SqliteStore};

const GUILD: GuildId = GuildId(1048);

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn key(name: &str, artist: &str, rater: i64, suggester: i64) -> RecKey {
  RecKey {
    song:      Song::new(name, artist),
    rater:     UserId(rater),
    suggester: UserId(suggester),
    guild:     GUILD,
  }
}

fn rating(value: i64) -> Rating {
  Rating::new(value).expect("valid test rating")
}

/// Insert a closed rating through the manual path.
async fn closed(s: &SqliteStore, k: &RecKey, value: i64) {
  s.add_manual_rating(k, Utc::now(), RecStatus::Closed(rating(value)))
    .await
    .unwrap();
}

// ─── Threads ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_thread() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();

  let fetched = s.get_thread(ThreadId(100)).await.unwrap().unwrap();
  assert_eq!(fetched, t);
  assert_eq!(fetched.next_user(), UserId(1));

  // Participant rows were created lazily.
  let users = s.list_users().await.unwrap();
  assert!(users.contains(&UserId(1)) && users.contains(&UserId(2)));
}

#[tokio::test]
async fn get_thread_missing_returns_none() {
  let s = store().await;
  assert!(s.get_thread(ThreadId(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn create_duplicate_thread_conflicts() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();

  let err = s.create_thread(&t).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ThreadExists(ThreadId(100)))));
}

#[tokio::test]
async fn flip_persists_and_is_involutive() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();

  let once = s.flip_thread(&t, None).await.unwrap();
  assert_eq!(once.next_user(), UserId(2));
  assert_eq!(
    s.get_thread(ThreadId(100)).await.unwrap().unwrap().next_user(),
    UserId(2)
  );

  let twice = s.flip_thread(&once, None).await.unwrap();
  assert_eq!(twice.next_user(), t.next_user());
}

#[tokio::test]
async fn flip_to_non_member_fails() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();

  let err = s.flip_thread(&t, Some(UserId(99))).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NextUserNotMember { .. })));
}

#[tokio::test]
async fn flip_after_delink_fails() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();
  s.delink_thread(ThreadId(100)).await.unwrap();

  let err = s.flip_thread(&t, None).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ThreadNotFound(_))));
}

#[tokio::test]
async fn delink_leaves_rating_history_intact() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();
  closed(&s, &key("Goodbye", "AREZRA", 2, 1), 8).await;

  s.delink_thread(ThreadId(100)).await.unwrap();
  assert!(s.get_thread(ThreadId(100)).await.unwrap().is_none());
  assert_eq!(s.list_recommendations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delink_missing_thread_fails() {
  let s = store().await;
  let err = s.delink_thread(ThreadId(404)).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ThreadNotFound(_))));
}

#[tokio::test]
async fn waiting_threads_scoped_by_guild() {
  let s = store().await;

  s.create_thread(&Thread::new(ThreadId(1), GuildId(10), UserId(1), UserId(2)))
    .await
    .unwrap();
  s.create_thread(&Thread::new(ThreadId(2), GuildId(20), UserId(1), UserId(3)))
    .await
    .unwrap();
  // User 2 at bat, not user 1.
  let t3 = Thread::new(ThreadId(3), GuildId(10), UserId(2), UserId(1));
  s.create_thread(&t3).await.unwrap();

  let everywhere = s.waiting_threads(UserId(1), None).await.unwrap();
  assert_eq!(everywhere.len(), 2);

  let in_ten = s.waiting_threads(UserId(1), Some(GuildId(10))).await.unwrap();
  assert_eq!(in_ten.len(), 1);
  assert_eq!(in_ten[0].thread_id, ThreadId(1));
}

// ─── Open recommendation lifecycle ───────────────────────────────────────────

#[tokio::test]
async fn recommend_flow_opens_and_fetches() {
  let s = store().await;

  let t = Thread::new(ThreadId(100), GUILD, UserId(1), UserId(2));
  s.create_thread(&t).await.unwrap();

  // User 1 recommends: turn flips to user 2, who becomes the rater.
  let t = s.flip_thread(&t, None).await.unwrap();
  let k = key("Goodbye", "AREZRA", 2, 1);
  assert!(!s.thread_has_open_rec(&t).await.unwrap());

  let rec = s.create_open_rec(&k, Utc::now()).await.unwrap();
  assert_eq!(rec.status, RecStatus::Open);

  assert!(s.thread_has_open_rec(&t).await.unwrap());
  let open = s.open_rec_for_thread(&t).await.unwrap().unwrap();
  assert_eq!(open.key(), k);
  assert!(!open.is_closed());
}

#[tokio::test]
async fn second_open_rec_for_pair_conflicts() {
  let s = store().await;

  s.create_open_rec(&key("Goodbye", "AREZRA", 2, 1), Utc::now())
    .await
    .unwrap();
  let err = s
    .create_open_rec(&key("Drowning", "AREZRA", 2, 1), Utc::now())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::OpenRecExists)));

  // The reverse direction is a different pair and is fine.
  s.create_open_rec(&key("Drowning", "AREZRA", 1, 2), Utc::now())
    .await
    .unwrap();
}

#[tokio::test]
async fn close_rec_records_rating() {
  let s = store().await;

  let k = key("Goodbye", "AREZRA", 2, 1);
  s.create_open_rec(&k, Utc::now()).await.unwrap();

  let rec = s.close_rec(&k, rating(8)).await.unwrap();
  assert_eq!(rec.status, RecStatus::Closed(rating(8)));

  let t = Thread::with_next(ThreadId(100), GUILD, UserId(1), UserId(2), UserId(2))
    .unwrap();
  assert!(s.open_rec_for_thread(&t).await.unwrap().is_none());
}

#[tokio::test]
async fn close_rec_without_open_row_fails() {
  let s = store().await;

  let err = s
    .close_rec(&key("Goodbye", "AREZRA", 2, 1), rating(8))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::OpenRecNotFound)));
  // It never fabricates a row.
  assert!(s.list_recommendations().await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_deletes_only_the_open_row() {
  let s = store().await;

  let k = key("Goodbye", "AREZRA", 2, 1);
  closed(&s, &k, 8).await;
  s.create_open_rec(&k, Utc::now()).await.unwrap();

  s.delete_open_rec(&k).await.unwrap();

  // The closed historical row with the same key survives the clear.
  let remaining = s.list_recommendations().await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert!(remaining[0].is_closed());

  let err = s.delete_open_rec(&k).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::OpenRecNotFound)));
}

// ─── Manual ratings ──────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_rating_duplicate_closed_conflicts() {
  let s = store().await;

  let k = key("Sandstorm", "Darude", 12345, 3);
  closed(&s, &k, 10).await;

  let err = s
    .add_manual_rating(&k, Utc::now(), RecStatus::Closed(rating(7)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::RatingExists)));

  // A different song or pair succeeds.
  closed(&s, &key("Sandstorm", "DaDude", 12345, 3), 7).await;
  closed(&s, &key("Sandstorm", "Darude", 3, 12345), 7).await;
}

#[tokio::test]
async fn manual_rating_conflict_key_includes_guild() {
  let s = store().await;

  let mut k = key("Goodbye", "AREZRA", 2, 1);
  closed(&s, &k, 8).await;

  k.guild = GuildId(9999);
  s.add_manual_rating(&k, Utc::now(), RecStatus::Closed(rating(6)))
    .await
    .unwrap();
}

#[tokio::test]
async fn manual_rating_may_be_open() {
  let s = store().await;

  let k = key("Goodbye", "AREZRA", 2, 1);
  let rec = s
    .add_manual_rating(&k, Utc::now(), RecStatus::Open)
    .await
    .unwrap();
  assert!(!rec.is_closed());

  let open = s.ratings_by_rater(UserId(2), false).await.unwrap();
  assert_eq!(open.len(), 1);
}

// ─── Song identity ───────────────────────────────────────────────────────────

#[tokio::test]
async fn song_identity_is_case_insensitive_in_store() {
  let s = store().await;

  closed(&s, &key("Sandstorm", "Darude", 1, 2), 10).await;
  closed(&s, &key("sandstorm", "darude", 3, 2), 7).await;

  // Both ratings resolved to the same stored song row.
  assert_eq!(s.list_songs().await.unwrap().len(), 1);

  let both = s
    .ratings_by_song(&Song::new("SANDSTORM", "DARUDE"))
    .await
    .unwrap();
  assert_eq!(both.len(), 2);
}

// ─── Rerate ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rerate_overwrites_single_match_in_place() {
  let s = store().await;

  let k = key("Goodbye", "AREZRA", 2, 1);
  s.create_open_rec(&k, Utc::now()).await.unwrap();
  s.close_rec(&k, rating(5)).await.unwrap();

  let rec = s
    .rerate(&k.song, UserId(2), UserId(1), rating(9))
    .await
    .unwrap();
  assert_eq!(rec.rating(), Some(rating(9)));

  let rows = s.ratings_by_rater(UserId(2), true).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].rating(), Some(rating(9)));
}

#[tokio::test]
async fn rerate_without_match_fails() {
  let s = store().await;

  let err = s
    .rerate(&Song::new("Goodbye", "AREZRA"), UserId(2), UserId(1), rating(9))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ClosedRecNotFound)));
}

#[tokio::test]
async fn rerate_with_ambiguous_history_fails_closed() {
  let s = store().await;

  // The same pair rated the same song twice over the thread flow; both rows
  // share the lookup key and differ only by timestamp.
  let k = key("Goodbye", "AREZRA", 2, 1);
  s.create_open_rec(&k, Utc::now()).await.unwrap();
  s.close_rec(&k, rating(5)).await.unwrap();
  s.create_open_rec(&k, Utc::now()).await.unwrap();
  s.close_rec(&k, rating(7)).await.unwrap();

  let err = s
    .rerate(&k.song, UserId(2), UserId(1), rating(9))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AmbiguousRerate(2))));
}

// ─── Analytics ───────────────────────────────────────────────────────────────

/// Seed the rating fixture from the original exchange history: user 1
/// suggests "Goodbye" to several raters, and gets suggestions back.
async fn seed_ratings(s: &SqliteStore) {
  closed(s, &key("Goodbye", "AREZRA", 12345, 1), 10).await;
  closed(s, &key("Goodbye", "AREZRA", 2, 1), 6).await;
  closed(s, &key("Goodbye", "AREZRA", 3, 1), 8).await;
  closed(s, &key("Goodbye", "AREZRA", 4, 1), 5).await;

  closed(s, &key("Drowning", "AREZRA", 1, 12345), 8).await;
  closed(s, &key("My Son John", "Smokey Bastard", 1, 2), 6).await;
  closed(s, &key("Time Bomb", "Feint", 1, 3), 7).await;
  closed(s, &key("Dead Inside", "Younger Hunger", 1, 4), 3).await;

  closed(s, &key("Drowning", "AREZRA", 3, 2), 8).await;
  closed(s, &key("Drowning", "AREZRA", 3, 4), 7).await;
  closed(s, &key("Dead Inside", "Younger Hunger", 3, 2), 5).await;
}

#[tokio::test]
async fn max_rating_returns_all_ties() {
  let s = store().await;

  closed(&s, &key("Goodbye", "AREZRA", 2, 1), 8).await;
  closed(&s, &key("Time Bomb", "Feint", 3, 1), 8).await;
  closed(&s, &key("Dead Inside", "Younger Hunger", 4, 1), 5).await;

  let maxes = s.max_rating(UserId(1), None).await.unwrap();
  assert_eq!(maxes.len(), 2);
  assert!(maxes.iter().all(|r| r.rating() == Some(rating(8))));

  let to_three = s.max_rating(UserId(1), Some(UserId(3))).await.unwrap();
  assert_eq!(to_three.len(), 1);
  assert_eq!(to_three[0].song, Song::new("Time Bomb", "Feint"));
}

#[tokio::test]
async fn max_rating_ignores_open_rows() {
  let s = store().await;

  s.create_open_rec(&key("Goodbye", "AREZRA", 2, 1), Utc::now())
    .await
    .unwrap();
  assert!(s.max_rating(UserId(1), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn average_and_total_distinguish_no_data_from_zero() {
  let s = store().await;

  assert_eq!(s.average_rating(UserId(1), None).await.unwrap(), None);
  assert_eq!(s.total_rating(UserId(1), None).await.unwrap(), None);

  closed(&s, &key("Goodbye", "AREZRA", 2, 1), 6).await;
  closed(&s, &key("Time Bomb", "Feint", 3, 1), 8).await;

  assert_eq!(s.average_rating(UserId(1), None).await.unwrap(), Some(7.0));
  assert_eq!(s.total_rating(UserId(1), None).await.unwrap(), Some(14));
  assert_eq!(
    s.total_rating(UserId(1), Some(UserId(2))).await.unwrap(),
    Some(6)
  );
}

#[tokio::test]
async fn leaderboards_group_by_suggester_descending() {
  let s = store().await;
  seed_ratings(&s).await;

  // User 1 received 10+6+8+5 = 29; user 2 received 6+8+5 = 19.
  let totals = s.leaderboard_total(None).await.unwrap();
  assert_eq!(totals[0].suggester, UserId(1));
  assert_eq!(totals[0].score, 29);
  assert!(totals.windows(2).all(|w| w[0].score >= w[1].score));

  let averages = s.leaderboard_average(None).await.unwrap();
  let one = averages.iter().find(|e| e.suggester == UserId(1)).unwrap();
  assert!((one.score - 29.0 / 4.0).abs() < 1e-9);
  assert!(averages.windows(2).all(|w| w[0].score >= w[1].score));

  // One representative max-rated row per suggester.
  let maxes = s.leaderboard_max(None).await.unwrap();
  let suggesters: Vec<_> = maxes.iter().map(|r| r.suggester).collect();
  let mut deduped = suggesters.clone();
  deduped.dedup();
  assert_eq!(suggesters, deduped);
  assert_eq!(maxes[0].rating(), Some(rating(10)));

  // Restricted to one rater.
  let by_three = s.leaderboard_total(Some(UserId(3))).await.unwrap();
  assert!(by_three.iter().all(|e| e.score > 0));
  let two = by_three.iter().find(|e| e.suggester == UserId(2)).unwrap();
  assert_eq!(two.score, 8 + 5);
}

#[tokio::test]
async fn overlap_pairs_best_ratings_per_song() {
  let s = store().await;
  seed_ratings(&s).await;
  // User 1 also rated Drowning a second time, via a different suggester;
  // only the max should surface.
  closed(&s, &key("Drowning", "AREZRA", 1, 2), 4).await;

  let pairs = s.overlap(UserId(1), UserId(3)).await.unwrap();
  assert_eq!(pairs.len(), 2); // Drowning + Dead Inside

  let drowning = pairs
    .iter()
    .find(|p| p.first.song == Song::new("Drowning", "AREZRA"))
    .unwrap();
  assert_eq!(drowning.first.rater, UserId(1));
  assert_eq!(drowning.first.rating(), Some(rating(8)));
  assert_eq!(drowning.second.rater, UserId(3));
  assert_eq!(drowning.second.rating(), Some(rating(8)));
}

#[tokio::test]
async fn overlap_is_symmetric_with_roles_swapped() {
  let s = store().await;
  seed_ratings(&s).await;

  let forward = s.overlap(UserId(1), UserId(3)).await.unwrap();
  let backward = s.overlap(UserId(3), UserId(1)).await.unwrap();
  assert_eq!(forward.len(), backward.len());

  let mut fwd_songs: Vec<_> = forward.iter().map(|p| p.first.song.clone()).collect();
  let mut bwd_songs: Vec<_> = backward.iter().map(|p| p.first.song.clone()).collect();
  fwd_songs.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
  bwd_songs.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
  assert_eq!(fwd_songs, bwd_songs);

  for pair in &backward {
    assert_eq!(pair.first.rater, UserId(3));
    assert_eq!(pair.second.rater, UserId(1));
  }
}

// ─── History scans ───────────────────────────────────────────────────────────

#[tokio::test]
async fn history_scans() {
  let s = store().await;
  seed_ratings(&s).await;

  assert_eq!(s.ratings_by_suggester(UserId(1), true).await.unwrap().len(), 4);
  assert_eq!(s.ratings_by_rater(UserId(3), true).await.unwrap().len(), 3);
  assert_eq!(
    s.ratings_by_artist("arezra").await.unwrap().len(),
    7 // four Goodbye ratings + three Drowning ratings
  );

  // Between users 2 and 3: Drowning (3 rated, 2 suggested) and
  // Dead Inside (3 rated, 2 suggested).
  let between = s.history_between(UserId(2), UserId(3)).await.unwrap();
  assert_eq!(between.len(), 2);
  assert!(
    between
      .iter()
      .all(|r| r.rater == UserId(3) && r.suggester == UserId(2))
  );
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_exchange_round() {
  let s = store().await;

  // X creates a thread with Y; X is at bat.
  let x = UserId(10);
  let y = UserId(20);
  let t = Thread::new(ThreadId(555), GUILD, x, y);
  s.create_thread(&t).await.unwrap();
  t.authorize_turn(x).unwrap();

  // X recommends: flip first, then open the rec toward the new turn holder.
  let t = s.flip_thread(&t, None).await.unwrap();
  let k = RecKey {
    song:      Song::new("Goodbye", "AREZRA"),
    rater:     y,
    suggester: x,
    guild:     GUILD,
  };
  assert!(!s.thread_has_open_rec(&t).await.unwrap());
  s.create_open_rec(&k, Utc::now()).await.unwrap();

  // Y rates it 8: the recommendation closes.
  t.authorize_turn(y).unwrap();
  s.close_rec(&k, rating(8)).await.unwrap();
  assert!(s.open_rec_for_thread(&t).await.unwrap().is_none());

  // The aggregates see the closed rating.
  assert_eq!(s.total_rating(x, None).await.unwrap(), Some(8));
  let maxes = s.max_rating(x, None).await.unwrap();
  assert_eq!(maxes.len(), 1);
  assert_eq!(maxes[0].song, Song::new("Goodbye", "AREZRA"));
  assert_eq!(maxes[0].rating(), Some(rating(8)));
}
