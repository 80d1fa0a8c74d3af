//! Legacy flat backend for the Sekolah record store.
//!
//! Models the browser's flat key-value storage: a single namespace of string
//! keys and string values with a small capacity ceiling. Each table is one
//! JSON array under a prefixed key and is rewritten whole on every change.
//! Persistence is a single SQLite `kv` table behind [`tokio_rusqlite`].

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_CAPACITY_BYTES, FlatStore};

#[cfg(test)]
mod tests;
