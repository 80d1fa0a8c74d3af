//! Core types and trait definitions for the Sekolah data layer.
//!
//! This crate is deliberately free of database and filesystem dependencies.
//! Both storage backends and the storage services depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod blob;
pub mod error;
pub mod record;
pub mod store;
pub mod tables;

pub use error::{Error, Result};
