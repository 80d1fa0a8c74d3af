//! Inventory of everything Sekolah keeps on disk.
//!
//! The accountant reads three areas independently: the structured record
//! store, the legacy flat key space and the file store. The aggregate
//! estimate is measured separately (size of the data directory) and is not
//! expected to equal the sum of the three components; SQLite page slack and
//! journal files account for the difference.

use std::collections::BTreeMap;

use serde::Serialize;

use sekolah_core::{
  store::RecordStore,
  tables::{
    EKSKUL_SENTINEL_KEY, MIGRATION_SENTINEL_KEY, describe_table, is_whitelisted,
    table_from_legacy_key,
  },
};

use crate::{
  Result, Storage,
  files::{FileUsage, dir_usage},
  migration::{MigrationPlan, MigrationStatus},
};

#[derive(Debug, Clone, Serialize)]
pub struct StorageEstimate {
  pub usage_bytes:  u64,
  pub quota_bytes:  u64,
  pub percent_used: f64,
}

impl StorageEstimate {
  fn new(usage_bytes: u64, quota_bytes: u64) -> Self {
    let percent_used = if quota_bytes == 0 {
      0.0
    } else {
      usage_bytes as f64 * 100.0 / quota_bytes as f64
    };
    Self { usage_bytes, quota_bytes, percent_used }
  }
}

/// One table of the structured store.
#[derive(Debug, Clone, Serialize)]
pub struct TableUsage {
  pub table:       String,
  pub records:     usize,
  /// Size of the table serialised as JSON.
  pub size_bytes:  u64,
  pub description: Option<&'static str>,
}

/// One key of the legacy flat store.
#[derive(Debug, Clone, Serialize)]
pub struct StorageItem {
  pub key:            String,
  /// UTF-8 length of key plus value.
  pub size_bytes:     u64,
  pub description:    String,
  pub is_whitelisted: bool,
  pub should_remove:  bool,
  /// The table this key holds, for `sekolah_<table>` keys.
  pub table:          Option<String>,
  /// Records the structured store holds for [`StorageItem::table`].
  pub modern_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageData {
  pub estimate:  StorageEstimate,
  pub modern:    Vec<TableUsage>,
  pub legacy:    Vec<StorageItem>,
  pub files:     FileUsage,
  pub migration: MigrationStatus,
}

impl StorageData {
  pub fn modern_bytes(&self) -> u64 { self.modern.iter().map(|t| t.size_bytes).sum() }

  pub fn legacy_bytes(&self) -> u64 { self.legacy.iter().map(|i| i.size_bytes).sum() }

  /// Keys flagged for removal, in key order.
  pub fn removable_keys(&self) -> Vec<String> {
    self
      .legacy
      .iter()
      .filter(|i| i.should_remove)
      .map(|i| i.key.clone())
      .collect()
  }

  /// Bytes that removing [`StorageData::removable_keys`] would free.
  pub fn reclaimable_bytes(&self) -> u64 {
    self.legacy.iter().filter(|i| i.should_remove).map(|i| i.size_bytes).sum()
  }
}

/// Classify one legacy key against the structured store's record counts.
///
/// A key is removable when it holds a legacy table whose structured
/// counterpart has at least one record, and it is not whitelisted.
pub fn classify(key: &str, value_len: usize, modern_counts: &BTreeMap<String, usize>) -> StorageItem {
  let table = table_from_legacy_key(key);
  let modern_records = table.and_then(|t| modern_counts.get(t)).copied().unwrap_or(0);
  let is_whitelisted = is_whitelisted(key);

  StorageItem {
    key: key.to_owned(),
    size_bytes: (key.len() + value_len) as u64,
    description: describe_key(key, table),
    is_whitelisted,
    should_remove: table.is_some() && modern_records > 0 && !is_whitelisted,
    table: table.map(str::to_owned),
    modern_records,
  }
}

fn describe_key(key: &str, table: Option<&str>) -> String {
  match (key, table) {
    (MIGRATION_SENTINEL_KEY, _) => "core migration completion marker".into(),
    (EKSKUL_SENTINEL_KEY, _) => "extracurricular migration completion marker".into(),
    ("theme", _) => "interface theme preference".into(),
    ("sidebar_collapsed", _) => "sidebar layout preference".into(),
    ("filter_preferences", _) => "saved list filters".into(),
    (_, Some(table)) => match describe_table(table) {
      Some(label) => format!("legacy {label}"),
      None => format!("legacy table {table}"),
    },
    _ => "unrecognised key".into(),
  }
}

/// Computes [`StorageData`] for a [`Storage`] context.
pub struct StorageAccountant<'s> {
  storage: &'s Storage,
}

impl<'s> StorageAccountant<'s> {
  pub fn new(storage: &'s Storage) -> Self { Self { storage } }

  async fn modern_usage(&self) -> Result<Vec<TableUsage>> {
    let snapshot = self.storage.modern().export_all().await?;
    snapshot
      .into_iter()
      .map(|(table, records)| -> Result<TableUsage> {
        let size_bytes = serde_json::to_vec(&records)?.len() as u64;
        let description = describe_table(&table);
        Ok(TableUsage { records: records.len(), table, size_bytes, description })
      })
      .collect()
  }

  /// Take a fresh inventory of all three storage areas.
  pub async fn calculate_storage_usage(&self) -> Result<StorageData> {
    let modern = self.modern_usage().await?;
    let counts: BTreeMap<String, usize> =
      modern.iter().map(|t| (t.table.clone(), t.records)).collect();

    let legacy: Vec<StorageItem> = self
      .storage
      .legacy()
      .items()
      .await?
      .into_iter()
      .map(|(key, value)| classify(&key, value.len(), &counts))
      .collect();

    let files = self.storage.files().total_usage().await?;
    let migration = self.storage.migrator(MigrationPlan::CORE).migration_status().await?;

    let usage_bytes = match self.storage.data_dir() {
      Some(dir) => dir_usage(dir).await?.bytes,
      None => {
        modern.iter().map(|t| t.size_bytes).sum::<u64>()
          + legacy.iter().map(|i| i.size_bytes).sum::<u64>()
          + files.bytes
      }
    };
    let estimate = StorageEstimate::new(usage_bytes, self.storage.config().quota_bytes);

    tracing::debug!(
      usage_bytes,
      modern_tables = modern.len(),
      legacy_keys = legacy.len(),
      files = files.files,
      "storage usage calculated"
    );

    Ok(StorageData { estimate, modern, legacy, files, migration })
  }

  /// Remove `keys` from the flat store. Returns how many of them existed.
  ///
  /// The keys are removed as given; callers normally pass
  /// [`StorageData::removable_keys`] from a recent inventory.
  pub async fn cleanup_old_data(&self, keys: &[String]) -> Result<usize> {
    let mut removed = 0;
    for key in keys {
      if self.storage.legacy().remove_item(key).await? {
        tracing::info!(key = %key, "removed legacy key");
        removed += 1;
      }
    }
    Ok(removed)
  }
}
