//! Error type for `sekolah-store-flat`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sekolah_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Record not found")]
  RecordNotFound,

  #[error("Record already exists: {0}")]
  DuplicateId(String),

  /// A write would push the key space past its capacity ceiling.
  #[error("storage quota exceeded: {needed} bytes needed, capacity is {capacity} bytes")]
  QuotaExceeded { needed: u64, capacity: u64 },
}

impl Error {
  pub fn is_not_found(&self) -> bool { matches!(self, Self::RecordNotFound) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
