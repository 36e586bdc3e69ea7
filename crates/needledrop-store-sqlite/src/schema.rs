//! SQL schema for the Needledrop SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// `COLLATE NOCASE` on the song columns makes song identity case-insensitive
/// at the storage layer, matching `needledrop_core::song::Song` equality.
/// The partial unique index `rec_open_pair_idx` backstops the at-most-one-
/// open-recommendation-per-pair invariant that the lifecycle layer relies
/// on, and the CHECK on `recommendation` ties the rating sentinel to the
/// closed flag.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS user (
    discord_id  INTEGER PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS song (
    song_name   TEXT NOT NULL COLLATE NOCASE,
    artist      TEXT NOT NULL COLLATE NOCASE,
    PRIMARY KEY (song_name, artist)
);

CREATE TABLE IF NOT EXISTS thread (
    thread_id   INTEGER PRIMARY KEY NOT NULL,
    guild_id    INTEGER NOT NULL,
    user1_id    INTEGER NOT NULL REFERENCES user(discord_id)
                    ON DELETE CASCADE ON UPDATE CASCADE,
    user2_id    INTEGER NOT NULL REFERENCES user(discord_id)
                    ON DELETE CASCADE ON UPDATE CASCADE,
    next_user   INTEGER NOT NULL REFERENCES user(discord_id)
                    ON DELETE CASCADE ON UPDATE CASCADE,
    CHECK (next_user IN (user1_id, user2_id))
);

CREATE TABLE IF NOT EXISTS recommendation (
    song_name    TEXT NOT NULL COLLATE NOCASE,
    artist       TEXT NOT NULL COLLATE NOCASE,
    rater_id     INTEGER NOT NULL REFERENCES user(discord_id)
                     ON DELETE CASCADE ON UPDATE CASCADE,
    suggester_id INTEGER NOT NULL REFERENCES user(discord_id)
                     ON DELETE CASCADE ON UPDATE CASCADE,
    guild_id     INTEGER NOT NULL,
    timestamp    TEXT NOT NULL,     -- RFC 3339 UTC
    rating       INTEGER NOT NULL DEFAULT -1,
    is_closed    INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (song_name, artist) REFERENCES song (song_name, artist)
        ON DELETE CASCADE ON UPDATE CASCADE,
    CHECK (
        (is_closed = 0 AND rating = -1)
        OR (is_closed = 1 AND rating BETWEEN 1 AND 10)
    )
);

-- At most one open recommendation per (rater, suggester, guild) triple.
CREATE UNIQUE INDEX IF NOT EXISTS rec_open_pair_idx
    ON recommendation (rater_id, suggester_id, guild_id)
    WHERE is_closed = 0;

CREATE INDEX IF NOT EXISTS rec_suggester_idx
    ON recommendation (suggester_id, is_closed);
CREATE INDEX IF NOT EXISTS rec_rater_idx
    ON recommendation (rater_id, is_closed);
CREATE INDEX IF NOT EXISTS thread_next_user_idx
    ON thread (next_user);

PRAGMA user_version = 1;
";
