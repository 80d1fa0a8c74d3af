//! [`FlatStore`]: the legacy whole-blob implementation of [`RecordStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde_json::Value;

use sekolah_core::{
  record::{Fields, Record},
  store::{Predicate, RecordStore, TableSnapshot},
  tables::{legacy_key, table_from_legacy_key},
};

use crate::{Error, Result, schema::SCHEMA};

/// Capacity ceiling of the key space, matching what browsers grant an origin
/// for flat storage.
pub const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A flat key-value space holding whole-table JSON blobs.
///
/// Every record operation reads the entire table blob, mutates it in memory
/// and writes the entire blob back. Nothing serialises two writers to the
/// same table: the later write wins.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct FlatStore {
  conn:     tokio_rusqlite::Connection,
  capacity: u64,
}

impl FlatStore {
  /// Open (or create) a key space at `path` with the given capacity.
  pub async fn open(path: impl AsRef<Path>, capacity: u64) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, capacity };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory key space.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with_capacity(DEFAULT_CAPACITY_BYTES).await
  }

  pub async fn open_in_memory_with_capacity(capacity: u64) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, capacity };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn capacity(&self) -> u64 { self.capacity }

  // ── Raw key space ─────────────────────────────────────────────────────────

  pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_owned();
    let value = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT value FROM kv WHERE key = ?1", rusqlite::params![key], |r| {
              r.get(0)
            })
            .optional()?,
        )
      })
      .await?;
    Ok(value)
  }

  /// Write `value` under `key`, failing with [`Error::QuotaExceeded`] if the
  /// key space would grow past its capacity.
  pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let key      = key.to_owned();
    let value    = value.to_owned();
    let capacity = self.capacity;

    let rejected: Option<u64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let others: i64 = tx.query_row(
          "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
           FROM kv WHERE key != ?1",
          rusqlite::params![key],
          |r| r.get(0),
        )?;
        let needed = others as u64 + key.len() as u64 + value.len() as u64;
        if needed > capacity {
          return Ok(Some(needed));
        }
        tx.execute(
          "INSERT INTO kv (key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          rusqlite::params![key, value],
        )?;
        tx.commit()?;
        Ok(None)
      })
      .await?;

    match rejected {
      Some(needed) => Err(Error::QuotaExceeded { needed, capacity }),
      None => Ok(()),
    }
  }

  /// Remove `key`. Returns whether it existed.
  pub async fn remove_item(&self, key: &str) -> Result<bool> {
    let key = key.to_owned();
    let removed = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?))
      .await?;
    Ok(removed > 0)
  }

  pub async fn keys(&self) -> Result<Vec<String>> {
    let keys = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(keys)
  }

  /// Every `(key, value)` pair, ordered by key.
  pub async fn items(&self) -> Result<Vec<(String, String)>> {
    let items = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(items)
  }

  /// Bytes currently used, measured as UTF-8 key plus value lengths.
  pub async fn used_bytes(&self) -> Result<u64> {
    let used: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
          [],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(used as u64)
  }

  // ── Table blobs ───────────────────────────────────────────────────────────

  /// Read and normalise a table blob. A missing key is an empty table; so is
  /// a blob that does not parse as a JSON array.
  async fn read_table(&self, table: &str) -> Result<Vec<Record>> {
    let Some(raw) = self.get_item(&legacy_key(table)).await? else {
      return Ok(Vec::new());
    };

    let rows: Vec<Value> = match serde_json::from_str(&raw) {
      Ok(rows) => rows,
      Err(e) => {
        tracing::warn!(table, error = %e, "corrupt legacy table blob, reading as empty");
        return Ok(Vec::new());
      }
    };

    let now = Utc::now();
    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
      match Record::from_legacy(table, index, row, now) {
        Ok(record) => records.push(record),
        Err(e) => tracing::warn!(table, error = %e, "skipping malformed legacy row"),
      }
    }
    Ok(records)
  }

  async fn write_table(&self, table: &str, records: &[Record]) -> Result<()> {
    let blob = serde_json::to_string(records)?;
    tracing::debug!(table, records = records.len(), bytes = blob.len(), "writing legacy table blob");
    self.set_item(&legacy_key(table), &blob).await
  }

  /// Drop a whole table blob. Returns whether it existed.
  pub async fn remove_table(&self, table: &str) -> Result<bool> {
    self.remove_item(&legacy_key(table)).await
  }
}

fn matches(filter: Option<Predicate<'_>>, record: &Record) -> bool {
  filter.is_none_or(|f| f(record))
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for FlatStore {
  type Error = Error;

  async fn select(&self, table: &str, filter: Option<Predicate<'_>>) -> Result<Vec<Record>> {
    let mut records = self.read_table(table).await?;
    records.retain(|r| matches(filter, r));
    Ok(records)
  }

  async fn select_by_id(&self, table: &str, id: &str) -> Result<Option<Record>> {
    let records = self.read_table(table).await?;
    Ok(records.into_iter().find(|r| r.id == id))
  }

  async fn count(&self, table: &str, filter: Option<Predicate<'_>>) -> Result<usize> {
    let records = self.read_table(table).await?;
    Ok(records.iter().filter(|r| matches(filter, r)).count())
  }

  async fn tables(&self) -> Result<Vec<String>> {
    let keys = self.keys().await?;
    Ok(
      keys
        .iter()
        .filter_map(|k| table_from_legacy_key(k))
        .map(str::to_owned)
        .collect(),
    )
  }

  async fn export_all(&self) -> Result<TableSnapshot> {
    let mut snapshot = TableSnapshot::new();
    for table in self.tables().await? {
      let records = self.read_table(&table).await?;
      snapshot.insert(table, records);
    }
    Ok(snapshot)
  }

  async fn insert(&self, table: &str, fields: Fields) -> Result<Record> {
    let record = Record::new(fields, Utc::now());
    let mut records = self.read_table(table).await?;
    if records.iter().any(|r| r.id == record.id) {
      return Err(Error::DuplicateId(record.id));
    }
    records.push(record.clone());
    self.write_table(table, &records).await?;
    Ok(record)
  }

  async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
    let mut records = self.read_table(table).await?;
    let record = records
      .iter_mut()
      .find(|r| r.id == id)
      .ok_or(Error::RecordNotFound)?;
    record.merge(fields, Utc::now());
    let updated = record.clone();
    self.write_table(table, &records).await?;
    Ok(updated)
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    let mut records = self.read_table(table).await?;
    let index = records
      .iter()
      .position(|r| r.id == id)
      .ok_or(Error::RecordNotFound)?;
    records.remove(index);
    self.write_table(table, &records).await
  }

  async fn restore(&self, table: &str, record: Record) -> Result<()> {
    let mut records = self.read_table(table).await?;
    if records.iter().any(|r| r.id == record.id) {
      return Err(Error::DuplicateId(record.id));
    }
    records.push(record);
    self.write_table(table, &records).await
  }
}
