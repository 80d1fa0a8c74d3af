//! Typed views over the schema-agnostic record store.
//!
//! An [`Entity`] names its table and describes its domain fields with serde.
//! [`TypedTable`] converts between [`Stored<T>`] and raw [`Record`]s so page
//! code never handles untyped maps.

pub mod ekskul;
pub mod siswa;

use std::{marker::PhantomData, ops::Deref};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use sekolah_core::{
  record::{Fields, Record, into_fields},
  store::RecordStore,
};
use sekolah_store_sqlite::SqliteStore;

use crate::Result;

pub use self::{ekskul::Ekskul, siswa::Siswa};

/// A domain type persisted in a single table.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
  const TABLE: &'static str;
}

/// An entity together with its store-managed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
  pub id:         String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub data:       T,
}

impl<T: DeserializeOwned> Stored<T> {
  pub fn from_record(record: &Record) -> Result<Self> {
    Ok(serde_json::from_value(record.to_value()?)?)
  }
}

impl<T> Deref for Stored<T> {
  type Target = T;

  fn deref(&self) -> &T { &self.data }
}

/// Serialise an entity into the field map the store expects.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
  Ok(into_fields(serde_json::to_value(value)?)?)
}

/// Typed access to the table of `T` in the structured store.
pub struct TypedTable<'s, T> {
  store:   &'s SqliteStore,
  _entity: PhantomData<fn() -> T>,
}

impl<'s, T: Entity> TypedTable<'s, T> {
  pub fn new(store: &'s SqliteStore) -> Self { Self { store, _entity: PhantomData } }

  /// Rows that no longer match `T` are skipped with a warning.
  fn decode_all(records: Vec<Record>) -> Vec<Stored<T>> {
    records
      .iter()
      .filter_map(|record| match Stored::<T>::from_record(record) {
        Ok(stored) => Some(stored),
        Err(e) => {
          tracing::warn!(table = T::TABLE, id = %record.id, error = %e, "skipping malformed row");
          None
        }
      })
      .collect()
  }

  pub async fn all(&self) -> Result<Vec<Stored<T>>> {
    Ok(Self::decode_all(self.store.select(T::TABLE, None).await?))
  }

  pub async fn filter(&self, pred: impl Fn(&Stored<T>) -> bool) -> Result<Vec<Stored<T>>> {
    let mut rows = self.all().await?;
    rows.retain(|row| pred(row));
    Ok(rows)
  }

  /// First row matching `pred`, in insertion order.
  pub async fn find(&self, pred: impl Fn(&Stored<T>) -> bool) -> Result<Option<Stored<T>>> {
    Ok(self.all().await?.into_iter().find(|row| pred(row)))
  }

  pub async fn get(&self, id: &str) -> Result<Option<Stored<T>>> {
    match self.store.select_by_id(T::TABLE, id).await? {
      Some(record) => Ok(Some(Stored::from_record(&record)?)),
      None => Ok(None),
    }
  }

  pub async fn create(&self, value: &T) -> Result<Stored<T>> {
    let record = self.store.insert(T::TABLE, to_fields(value)?).await?;
    Stored::from_record(&record)
  }

  /// Shallow-merge `patch` into the row. Unknown keys are stored as given.
  pub async fn update(&self, id: &str, patch: Fields) -> Result<Stored<T>> {
    let record = self.store.update(T::TABLE, id, patch).await?;
    Stored::from_record(&record)
  }

  /// Overwrite every field `T` serialises.
  pub async fn replace(&self, id: &str, value: &T) -> Result<Stored<T>> {
    self.update(id, to_fields(value)?).await
  }

  pub async fn remove(&self, id: &str) -> Result<()> {
    self.store.delete(T::TABLE, id).await?;
    Ok(())
  }

  pub async fn count(&self) -> Result<usize> { Ok(self.store.count(T::TABLE, None).await?) }
}
