//! Error type for `sekolah-storage`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sekolah_core::Error),

  #[error(transparent)]
  Legacy(#[from] sekolah_store_flat::Error),

  #[error(transparent)]
  Records(#[from] sekolah_store_sqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The migration could not run at all. Legacy data is untouched.
  #[error("{plan} migration failed: {message}")]
  MigrationFatal { plan: &'static str, message: String },

  #[error("invalid file path: {0:?}")]
  InvalidPath(String),

  #[error("unsupported snapshot format: {0:?}")]
  UnsupportedSnapshot(String),
}

impl Error {
  /// Whether this is the store's "Record not found" failure.
  pub fn is_not_found(&self) -> bool {
    match self {
      Self::Legacy(e) => e.is_not_found(),
      Self::Records(e) => e.is_not_found(),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
