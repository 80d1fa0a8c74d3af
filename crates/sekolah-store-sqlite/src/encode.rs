//! Encoding and decoding helpers between [`Record`] and the plain-text
//! columns stored in SQLite.
//!
//! Timestamps are stored as RFC 3339 strings, domain fields as a compact
//! JSON object.

use chrono::{DateTime, SecondsFormat, Utc};
use sekolah_core::record::{Fields, Record};

use crate::{Error, Result};

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_fields(fields: &Fields) -> Result<String> { Ok(serde_json::to_string(fields)?) }

pub const COLUMNS: &str = "record_id, created_at, updated_at, fields";

/// Raw strings read directly from a `records` row.
pub struct RawRecord {
  pub record_id:  String,
  pub created_at: String,
  pub updated_at: String,
  pub fields:     String,
}

impl RawRecord {
  /// Map a row selected with [`COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:  row.get(0)?,
      created_at: row.get(1)?,
      updated_at: row.get(2)?,
      fields:     row.get(3)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      id:         self.record_id,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      fields:     serde_json::from_str(&self.fields)?,
    })
  }
}
