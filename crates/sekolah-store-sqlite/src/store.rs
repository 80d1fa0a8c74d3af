//! [`SqliteStore`]: the structured implementation of [`RecordStore`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tokio::sync::OnceCell;

use sekolah_core::{
  record::{Fields, Record},
  store::{Predicate, RecordStore, TableSnapshot},
};

use crate::{
  Error, Result,
  encode::{COLUMNS, RawRecord, encode_dt, encode_fields},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

enum Location {
  File(PathBuf),
  Memory,
}

struct Inner {
  location: Location,
  conn:     OnceCell<tokio_rusqlite::Connection>,
}

/// A record store backed by a single SQLite file.
///
/// Construction does no I/O. The connection is opened and the schema applied
/// on first use, exactly once, so callers never need to initialise the store
/// explicitly.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct SqliteStore {
  inner: Arc<Inner>,
}

impl SqliteStore {
  /// A store that will live at `path` once first used.
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self::with_location(Location::File(path.as_ref().to_path_buf()))
  }

  /// An in-memory store, mostly for tests.
  pub fn in_memory() -> Self { Self::with_location(Location::Memory) }

  fn with_location(location: Location) -> Self {
    Self { inner: Arc::new(Inner { location, conn: OnceCell::new() }) }
  }

  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let store = Self::new(path);
    store.init_db().await?;
    Ok(store)
  }

  /// Open an in-memory store and run schema initialisation.
  pub async fn open_in_memory() -> Result<Self> {
    let store = Self::in_memory();
    store.init_db().await?;
    Ok(store)
  }

  /// Open the connection and apply the schema. Idempotent: only the first
  /// call does any work, concurrent callers wait for it.
  pub async fn init_db(&self) -> Result<()> {
    self.conn().await?;
    Ok(())
  }

  pub fn is_initialized(&self) -> bool { self.inner.conn.initialized() }

  /// Path of the database file, `None` for in-memory stores.
  pub fn path(&self) -> Option<&Path> {
    match &self.inner.location {
      Location::File(path) => Some(path.as_path()),
      Location::Memory => None,
    }
  }

  async fn conn(&self) -> Result<&tokio_rusqlite::Connection> {
    self
      .inner
      .conn
      .get_or_try_init(|| async {
        let conn = match &self.inner.location {
          Location::File(path) => tokio_rusqlite::Connection::open(path).await?,
          Location::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
        };
        conn
          .call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
          })
          .await?;
        tracing::debug!(path = ?self.path(), "record database initialised");
        Ok::<_, Error>(conn)
      })
      .await
  }

  async fn load(&self, table: &str) -> Result<Vec<Record>> {
    let table = table.to_owned();
    let raws: Vec<RawRecord> = self
      .conn()
      .await?
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {COLUMNS} FROM records WHERE table_name = ?1 ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![table], RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

// ─── Row helpers (run on the connection thread) ─────────────────────────────

fn find_row(conn: &rusqlite::Connection, table: &str, id: &str) -> Result<Option<RawRecord>> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {COLUMNS} FROM records WHERE table_name = ?1 AND record_id = ?2"),
        rusqlite::params![table, id],
        RawRecord::from_row,
      )
      .optional()?,
  )
}

/// Insert `record` unless its id is taken. Returns whether it was written.
fn insert_row(conn: &mut rusqlite::Connection, table: &str, record: &Record) -> Result<bool> {
  let tx = conn.transaction()?;
  if find_row(&tx, table, &record.id)?.is_some() {
    return Ok(false);
  }
  tx.execute(
    "INSERT INTO records (table_name, record_id, created_at, updated_at, fields)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      table,
      record.id,
      encode_dt(record.created_at),
      encode_dt(record.updated_at),
      encode_fields(&record.fields)?,
    ],
  )?;
  tx.commit()?;
  Ok(true)
}

/// Read-merge-write of a single row inside one transaction.
fn update_row(
  conn: &mut rusqlite::Connection,
  table: &str,
  id: &str,
  patch: Fields,
) -> Result<Option<Record>> {
  let tx = conn.transaction()?;
  let Some(raw) = find_row(&tx, table, id)? else {
    return Ok(None);
  };
  let mut record = raw.into_record()?;
  record.merge(patch, Utc::now());
  tx.execute(
    "UPDATE records SET updated_at = ?3, fields = ?4
     WHERE table_name = ?1 AND record_id = ?2",
    rusqlite::params![table, id, encode_dt(record.updated_at), encode_fields(&record.fields)?],
  )?;
  tx.commit()?;
  Ok(Some(record))
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn select(&self, table: &str, filter: Option<Predicate<'_>>) -> Result<Vec<Record>> {
    let mut records = self.load(table).await?;
    if let Some(f) = filter {
      records.retain(|r| f(r));
    }
    Ok(records)
  }

  async fn select_by_id(&self, table: &str, id: &str) -> Result<Option<Record>> {
    let table = table.to_owned();
    let id    = id.to_owned();

    let raw = self
      .conn()
      .await?
      .call(move |conn| Ok(find_row(conn, &table, &id)))
      .await??;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn count(&self, table: &str, filter: Option<Predicate<'_>>) -> Result<usize> {
    if let Some(f) = filter {
      let records = self.load(table).await?;
      return Ok(records.iter().filter(|r| f(r)).count());
    }

    let table = table.to_owned();
    let n: i64 = self
      .conn()
      .await?
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM records WHERE table_name = ?1",
          rusqlite::params![table],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(n as usize)
  }

  async fn tables(&self) -> Result<Vec<String>> {
    let tables = self
      .conn()
      .await?
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT table_name FROM records ORDER BY table_name")?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(tables)
  }

  async fn export_all(&self) -> Result<TableSnapshot> {
    let mut snapshot = TableSnapshot::new();
    for table in self.tables().await? {
      let records = self.load(&table).await?;
      snapshot.insert(table, records);
    }
    Ok(snapshot)
  }

  async fn insert(&self, table: &str, fields: Fields) -> Result<Record> {
    let record = Record::new(fields, Utc::now());
    self.restore(table, record.clone()).await?;
    Ok(record)
  }

  async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
    let table = table.to_owned();
    let id    = id.to_owned();

    self
      .conn()
      .await?
      .call(move |conn| Ok(update_row(conn, &table, &id, fields)))
      .await??
      .ok_or(Error::RecordNotFound)
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    let table = table.to_owned();
    let id    = id.to_owned();

    let removed = self
      .conn()
      .await?
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM records WHERE table_name = ?1 AND record_id = ?2",
          rusqlite::params![table, id],
        )?)
      })
      .await?;

    if removed == 0 {
      return Err(Error::RecordNotFound);
    }
    Ok(())
  }

  async fn restore(&self, table: &str, record: Record) -> Result<()> {
    let table = table.to_owned();
    let id    = record.id.clone();

    let written = self
      .conn()
      .await?
      .call(move |conn| Ok(insert_row(conn, &table, &record)))
      .await??;

    if !written {
      return Err(Error::DuplicateId(id));
    }
    Ok(())
  }
}
