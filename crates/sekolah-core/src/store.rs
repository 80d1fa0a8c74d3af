//! The `RecordStore` trait and supporting types.
//!
//! The trait is implemented by both storage backends (`sekolah-store-flat`
//! and `sekolah-store-sqlite`). The migration engine, the storage accountant
//! and the domain wrappers depend on this abstraction.

use std::{collections::BTreeMap, future::Future};

use crate::record::{Fields, Record};

/// Row filter applied by [`RecordStore::select`] and [`RecordStore::count`].
pub type Predicate<'a> = &'a (dyn Fn(&Record) -> bool + Send + Sync);

/// A full snapshot of every table a store knows about.
pub type TableSnapshot = BTreeMap<String, Vec<Record>>;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a per-table record store backend.
///
/// Tables are created implicitly on first write. Ids are unique within a
/// table; nothing else is enforced, in particular no referential integrity
/// between tables.
///
/// No method panics on persistence failure: every failure is returned as
/// `Self::Error`, whose `Display` is a message fit for showing to a user.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// All records of `table` matching `filter`, in insertion order.
  fn select<'a>(
    &'a self,
    table: &'a str,
    filter: Option<Predicate<'a>>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  /// Retrieve one record by id. Returns `None` if not found.
  fn select_by_id<'a>(
    &'a self,
    table: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  fn count<'a>(
    &'a self,
    table: &'a str,
    filter: Option<Predicate<'a>>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Names of every table currently holding data.
  fn tables(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Snapshot every table.
  fn export_all(
    &self,
  ) -> impl Future<Output = Result<TableSnapshot, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new record. The id is taken from `fields["id"]` when present,
  /// generated otherwise; both timestamps are set by the store.
  fn insert<'a>(
    &'a self,
    table: &'a str,
    fields: Fields,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + 'a;

  /// Shallow-merge `fields` over an existing record and refresh
  /// `updated_at`. Fails with "Record not found" if `id` is absent.
  fn update<'a>(
    &'a self,
    table: &'a str,
    id: &'a str,
    fields: Fields,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + 'a;

  /// Hard-delete a record. Fails with "Record not found" if `id` is absent.
  fn delete<'a>(
    &'a self,
    table: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Write a complete record verbatim, keeping its id and timestamps.
  ///
  /// Used by migration and snapshot import. Fails if the id already exists.
  fn restore<'a>(
    &'a self,
    table: &'a str,
    record: Record,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
