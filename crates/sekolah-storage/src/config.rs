//! Storage configuration, deserialised from `config.toml` and `SEKOLAH_*`
//! environment variables by the host binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sekolah_store_flat::DEFAULT_CAPACITY_BYTES;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Directory holding both databases and the file store.
  pub data_dir:                     PathBuf,
  /// Capacity ceiling of the legacy flat key space.
  pub legacy_capacity_bytes:        u64,
  /// Quota reported as the denominator of the usage estimate.
  pub quota_bytes:                  u64,
  /// When `false` the file store runs in inline fallback mode.
  pub files_enabled:                bool,
  /// Clear migrated legacy tables as part of initialisation.
  pub clear_legacy_after_migration: bool,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      data_dir:                     PathBuf::from("sekolah-data"),
      legacy_capacity_bytes:        DEFAULT_CAPACITY_BYTES,
      quota_bytes:                  1024 * 1024 * 1024,
      files_enabled:                true,
      clear_legacy_after_migration: false,
    }
  }
}

impl StorageConfig {
  pub fn legacy_path(&self) -> PathBuf { self.data_dir.join("legacy.sqlite3") }

  pub fn records_path(&self) -> PathBuf { self.data_dir.join("records.sqlite3") }

  pub fn files_root(&self) -> Option<PathBuf> {
    self.files_enabled.then(|| self.data_dir.join("files"))
  }
}
