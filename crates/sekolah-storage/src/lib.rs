//! Storage services for Sekolah: migration, accounting, files and typed
//! domain façades over the record store backends.
//!
//! Everything is reached through a [`Storage`] context constructed once by
//! the host application. Nothing in this crate keeps process-wide state.

pub mod accountant;
pub mod backup;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod files;
pub mod migration;

pub use config::StorageConfig;
pub use context::{InitReport, Storage};
pub use error::{Error, Result};
