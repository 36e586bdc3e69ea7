//! Error type for `needledrop-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain failure: not-found, conflict, ambiguity, or a value that
  /// failed validation on the way out of the database.
  #[error(transparent)]
  Core(#[from] needledrop_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
