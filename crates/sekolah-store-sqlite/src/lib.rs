//! Structured backend for the Sekolah record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each record is one row; each table is
//! a partition of the `records` table keyed by `(table_name, record_id)`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
