//! Error type for `frames-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] frames_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown version status {0:?}")]
  UnknownStatus(String),

  #[error("version not found: {0}")]
  VersionNotFound(String),

  /// An in-place update addressed a slot row that does not exist.
  #[error("slot row {0} not found")]
  SlotNotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
