//! JSON snapshots of the structured record store.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sekolah_core::store::{RecordStore, TableSnapshot};

use crate::{Error, Result};

pub const SNAPSHOT_FORMAT: &str = "sekolah-snapshot-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub format:      String,
  pub exported_at: DateTime<Utc>,
  pub tables:      TableSnapshot,
}

impl Snapshot {
  pub fn record_count(&self) -> usize { self.tables.values().map(Vec::len).sum() }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
  pub copied:  usize,
  pub skipped: usize,
}

/// Per-table outcome of [`import_snapshot`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
  pub tables: BTreeMap<String, ImportCounts>,
}

impl ImportSummary {
  pub fn copied(&self) -> usize { self.tables.values().map(|c| c.copied).sum() }

  pub fn skipped(&self) -> usize { self.tables.values().map(|c| c.skipped).sum() }
}

pub async fn export_snapshot<S>(store: &S) -> Result<Snapshot>
where
  S: RecordStore,
  Error: From<S::Error>,
{
  Ok(Snapshot {
    format:      SNAPSHOT_FORMAT.to_owned(),
    exported_at: Utc::now(),
    tables:      store.export_all().await?,
  })
}

/// Restore every record of `snapshot` that `store` does not already hold.
///
/// Records are written verbatim, timestamps included. Existing ids are left
/// alone and counted as skipped.
pub async fn import_snapshot<S>(store: &S, snapshot: Snapshot) -> Result<ImportSummary>
where
  S: RecordStore,
  Error: From<S::Error>,
{
  if snapshot.format != SNAPSHOT_FORMAT {
    return Err(Error::UnsupportedSnapshot(snapshot.format));
  }

  let mut summary = ImportSummary::default();
  for (table, records) in snapshot.tables {
    let mut counts = ImportCounts::default();
    for record in records {
      if store.select_by_id(&table, &record.id).await?.is_some() {
        counts.skipped += 1;
        continue;
      }
      store.restore(&table, record).await?;
      counts.copied += 1;
    }
    tracing::info!(table = %table, copied = counts.copied, skipped = counts.skipped, "table imported");
    summary.tables.insert(table, counts);
  }
  Ok(summary)
}

pub async fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(parent).await?;
  }
  let json = serde_json::to_vec_pretty(snapshot)?;
  tokio::fs::write(path, json).await?;
  Ok(())
}

pub async fn read_snapshot(path: &Path) -> Result<Snapshot> {
  let bytes = tokio::fs::read(path).await?;
  Ok(serde_json::from_slice(&bytes)?)
}
