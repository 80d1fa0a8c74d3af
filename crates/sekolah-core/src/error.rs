//! Error types for `sekolah-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("record must be a JSON object, got {0}")]
  NotAnObject(&'static str),

  #[error("invalid blob reference: {0:?}")]
  InvalidBlobRef(String),

  #[error("invalid inline payload: {0}")]
  InvalidInlinePayload(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
