//! Blob references stored inside record fields.
//!
//! A reference is either an inline data URL (`data:<mime>;base64,<payload>`)
//! or a path into the file store (`opfs:<relative/path>`). The two forms are
//! told apart by their literal prefix only; both prefixes are part of the
//! persisted format and must not change.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const INLINE_PREFIX: &str = "data:";
pub const PATH_PREFIX: &str = "opfs:";

/// A parsed blob reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlobRef {
  /// A complete data URL, prefix included. Already displayable.
  Inline(String),
  /// A path relative to the file store root, prefix stripped.
  Path(String),
}

impl BlobRef {
  /// Parse a stored string. Anything without a known prefix is rejected.
  pub fn parse(s: &str) -> Result<Self> {
    if s.starts_with(INLINE_PREFIX) {
      Ok(Self::Inline(s.to_owned()))
    } else if let Some(path) = s.strip_prefix(PATH_PREFIX) {
      if path.is_empty() {
        return Err(Error::InvalidBlobRef(s.to_owned()));
      }
      Ok(Self::Path(path.to_owned()))
    } else {
      Err(Error::InvalidBlobRef(s.to_owned()))
    }
  }

  /// Encode raw bytes as an inline data URL.
  pub fn inline(media_type: &str, bytes: &[u8]) -> Self {
    Self::Inline(format!("{INLINE_PREFIX}{media_type};base64,{}", STANDARD.encode(bytes)))
  }

  pub fn path(path: impl Into<String>) -> Self { Self::Path(path.into()) }

  pub fn is_inline(&self) -> bool { matches!(self, Self::Inline(_)) }

  /// Decode an inline reference into `(media_type, bytes)`.
  ///
  /// Returns `Ok(None)` for path references.
  pub fn decode_inline(&self) -> Result<Option<(String, Vec<u8>)>> {
    let Self::Inline(url) = self else {
      return Ok(None);
    };
    let rest = url
      .strip_prefix(INLINE_PREFIX)
      .ok_or_else(|| Error::InvalidInlinePayload("missing data: prefix".into()))?;
    let (meta, payload) = rest
      .split_once(',')
      .ok_or_else(|| Error::InvalidInlinePayload("missing ',' separator".into()))?;
    let media_type = meta
      .strip_suffix(";base64")
      .ok_or_else(|| Error::InvalidInlinePayload("only base64 payloads are supported".into()))?;
    let media_type = if media_type.is_empty() {
      "application/octet-stream"
    } else {
      media_type
    };
    let bytes = STANDARD
      .decode(payload.trim())
      .map_err(|e| Error::InvalidInlinePayload(e.to_string()))?;
    Ok(Some((media_type.to_owned(), bytes)))
  }
}

impl fmt::Display for BlobRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Inline(url) => f.write_str(url),
      Self::Path(path) => write!(f, "{PATH_PREFIX}{path}"),
    }
  }
}

impl TryFrom<String> for BlobRef {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<BlobRef> for String {
  fn from(r: BlobRef) -> Self { r.to_string() }
}

/// File extension used when an inline payload is moved to the file store.
pub fn extension_for(media_type: &str) -> &'static str {
  match media_type {
    "image/png" => "png",
    "image/jpeg" | "image/jpg" => "jpg",
    "image/gif" => "gif",
    "image/webp" => "webp",
    "image/svg+xml" => "svg",
    "application/pdf" => "pdf",
    _ => "bin",
  }
}
