//! Error type for `sekolah-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sekolah_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("Record not found")]
  RecordNotFound,

  #[error("Record already exists: {0}")]
  DuplicateId(String),
}

impl Error {
  pub fn is_not_found(&self) -> bool { matches!(self, Self::RecordNotFound) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
