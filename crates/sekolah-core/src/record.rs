//! Record, the atomic unit of persistence.
//!
//! A record belongs to exactly one table and carries three store-managed
//! fields (`id`, `created_at`, `updated_at`). Everything else is an open map
//! of domain fields that the store never interprets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// Domain fields of a record, untyped at the store level.
pub type Fields = serde_json::Map<String, Value>;

/// Field names managed by the store. Callers cannot overwrite them through
/// [`Record::merge`].
pub const RESERVED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// One persisted row.
///
/// Serialises as a flat JSON object, so the stored form of a record is the
/// same shape the legacy flat backend always used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub id:         String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub fields:     Fields,
}

impl Record {
  /// Build a new record from caller-supplied fields.
  ///
  /// A non-empty string `id` in `fields` is kept; otherwise a v4 UUID is
  /// generated. Both timestamps are set to `now`.
  pub fn new(mut fields: Fields, now: DateTime<Utc>) -> Self {
    let id = match fields.remove("id") {
      Some(Value::String(s)) if !s.is_empty() => s,
      _ => Uuid::new_v4().hyphenated().to_string(),
    };
    fields.remove("created_at");
    fields.remove("updated_at");

    Self { id, created_at: now, updated_at: now, fields }
  }

  /// Normalise a record read from the legacy flat store.
  ///
  /// Legacy rows may carry numeric ids or no id at all, and may lack
  /// timestamps. A missing id is derived deterministically from the table
  /// name, the row's `index` in its blob and its content, so an unchanged
  /// blob always yields the same ids and two identical rows never share one.
  pub fn from_legacy(table: &str, index: usize, value: Value, now: DateTime<Utc>) -> Result<Self> {
    let mut fields = match value {
      Value::Object(map) => map,
      other => return Err(Error::NotAnObject(json_kind(&other))),
    };

    let id = match fields.remove("id") {
      Some(Value::String(s)) if !s.is_empty() => s,
      Some(Value::Number(n)) => n.to_string(),
      _ => {
        let content = serde_json::to_string(&fields)?;
        let name = format!("{table}\n{index}\n{content}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
          .hyphenated()
          .to_string()
      }
    };

    let created_at = fields
      .remove("created_at")
      .and_then(|v| parse_timestamp(&v))
      .unwrap_or(now);
    let updated_at = fields
      .remove("updated_at")
      .and_then(|v| parse_timestamp(&v))
      .unwrap_or(created_at);

    Ok(Self { id, created_at, updated_at, fields })
  }

  /// Shallow-merge `patch` over the domain fields and refresh `updated_at`.
  /// Reserved field names in `patch` are ignored.
  pub fn merge(&mut self, patch: Fields, now: DateTime<Utc>) {
    for (key, value) in patch {
      if RESERVED_FIELDS.contains(&key.as_str()) {
        continue;
      }
      self.fields.insert(key, value);
    }
    self.touch(now);
  }

  /// Refresh `updated_at`, never moving it backwards and always strictly
  /// past the previous value.
  pub fn touch(&mut self, now: DateTime<Utc>) {
    let floor = self.updated_at + Duration::microseconds(1);
    self.updated_at = now.max(floor);
  }

  pub fn get(&self, key: &str) -> Option<&Value> { self.fields.get(key) }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.fields.get(key).and_then(Value::as_str)
  }

  /// The record as a single JSON object, reserved fields included.
  pub fn to_value(&self) -> Result<Value> { Ok(serde_json::to_value(self)?) }
}

/// Unwrap a JSON object into [`Fields`].
pub fn into_fields(value: Value) -> Result<Fields> {
  match value {
    Value::Object(map) => Ok(map),
    other => Err(Error::NotAnObject(json_kind(&other))),
  }
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
  let s = v.as_str()?;
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

fn json_kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
