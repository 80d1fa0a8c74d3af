//! [`Storage`]: the single owner of every storage service.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use sekolah_core::{
  blob::{BlobRef, extension_for},
  record::Fields,
  store::RecordStore,
};
use sekolah_store_flat::FlatStore;
use sekolah_store_sqlite::SqliteStore;

use crate::{
  Result, StorageConfig,
  accountant::StorageAccountant,
  backup::{self, ImportSummary, Snapshot},
  domain::{Ekskul, Entity, TypedTable},
  files::FileStore,
  migration::{ClearSummary, MigrationOutcome, MigrationPlan, MigrationProgress, Migrator},
};

/// What [`Storage::initialize`] did.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
  pub core:    MigrationOutcome,
  pub ekskul:  MigrationOutcome,
  pub cleared: ClearSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlobUpgradeReport {
  pub scanned:  usize,
  pub upgraded: usize,
  /// Inline references left in place because the upgrade failed.
  pub kept:     usize,
}

/// Owns the legacy and structured stores, the file store and the
/// configuration. Construct one per process and pass it by reference.
pub struct Storage {
  config:       StorageConfig,
  data_dir:     Option<PathBuf>,
  legacy:       FlatStore,
  modern:       SqliteStore,
  files:        FileStore,
  ekskul_ready: OnceCell<()>,
}

impl Storage {
  /// Open the stores under `config.data_dir`, creating it if needed.
  ///
  /// The structured store is opened lazily on first use.
  pub async fn open(config: &StorageConfig) -> Result<Self> {
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let legacy = FlatStore::open(config.legacy_path(), config.legacy_capacity_bytes).await?;
    let modern = SqliteStore::new(config.records_path());
    tracing::debug!(data_dir = %config.data_dir.display(), "storage opened");

    Ok(Self {
      config: config.clone(),
      data_dir: Some(config.data_dir.clone()),
      legacy,
      modern,
      files: FileStore::new(config.files_root()),
      ekskul_ready: OnceCell::new(),
    })
  }

  /// Fully in-memory storage with inline-only files.
  pub async fn open_in_memory() -> Result<Self> {
    let config = StorageConfig::default();
    let legacy = FlatStore::open_in_memory_with_capacity(config.legacy_capacity_bytes).await?;
    Ok(Self {
      config,
      data_dir: None,
      legacy,
      modern: SqliteStore::in_memory(),
      files: FileStore::disabled(),
      ekskul_ready: OnceCell::new(),
    })
  }

  /// Replace the file store with one rooted at `root`.
  pub fn with_file_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.files = FileStore::new(Some(root.into()));
    self
  }

  pub fn with_config(mut self, config: StorageConfig) -> Self {
    self.config = config;
    self
  }

  pub fn config(&self) -> &StorageConfig { &self.config }

  /// Root of the on-disk data, `None` when in memory.
  pub fn data_dir(&self) -> Option<&Path> { self.data_dir.as_deref() }

  pub fn legacy(&self) -> &FlatStore { &self.legacy }

  pub fn modern(&self) -> &SqliteStore { &self.modern }

  pub fn files(&self) -> &FileStore { &self.files }

  pub fn migrator(&self, plan: MigrationPlan) -> Migrator<'_, SqliteStore> {
    Migrator::new(&self.legacy, &self.modern, plan)
  }

  pub fn accountant(&self) -> StorageAccountant<'_> { StorageAccountant::new(self) }

  pub fn ekskul(&self) -> Ekskul<'_> { Ekskul::new(self) }

  pub fn table<T: Entity>(&self) -> TypedTable<'_, T> { TypedTable::new(&self.modern) }

  // ── Initialisation ──────────────────────────────────────────────────────

  /// Bring the structured store up to date with legacy storage.
  ///
  /// Runs the core and extracurricular migrations when needed, then clears
  /// fully migrated legacy tables if the configuration asks for it.
  pub async fn initialize(
    &self,
    mut on_progress: impl FnMut(&MigrationProgress),
  ) -> Result<InitReport> {
    self.modern.init_db().await?;

    let core = self.migrator(MigrationPlan::CORE).run_if_needed(&mut on_progress).await?;
    let ekskul = self.migrator(MigrationPlan::EKSKUL).run_if_needed(&mut on_progress).await?;
    if self.ekskul_ready.set(()).is_err() {
      tracing::debug!("extracurricular tables already checked");
    }

    let mut cleared = ClearSummary::default();
    if self.config.clear_legacy_after_migration {
      for (plan, outcome) in [(MigrationPlan::CORE, &core), (MigrationPlan::EKSKUL, &ekskul)] {
        if let Some(report) = outcome.report() {
          let summary = self.migrator(plan).clear_legacy_data(report).await?;
          cleared.removed.extend(summary.removed);
          cleared.kept.extend(summary.kept);
        }
      }
    }

    tracing::info!(
      core_copied = core.report().map_or(0, |r| r.copied()),
      ekskul_copied = ekskul.report().map_or(0, |r| r.copied()),
      cleared = cleared.removed.len(),
      "storage initialised"
    );
    Ok(InitReport { core, ekskul, cleared })
  }

  /// Run the extracurricular migration once per context if it has not run.
  pub async fn ensure_ekskul_migrated(&self) -> Result<()> {
    self
      .ekskul_ready
      .get_or_try_init(|| async {
        let outcome = self
          .migrator(MigrationPlan::EKSKUL)
          .run_if_needed(|p| tracing::debug!(percent = p.percent, "{}", p.message))
          .await?;
        if let Some(report) = outcome.report() {
          tracing::info!(copied = report.copied(), "extracurricular data migrated on first access");
        }
        Ok::<_, crate::Error>(())
      })
      .await?;
    Ok(())
  }

  // ── Backup ──────────────────────────────────────────────────────────────

  pub async fn export_snapshot(&self) -> Result<Snapshot> {
    backup::export_snapshot(&self.modern).await
  }

  pub async fn import_snapshot(&self, snapshot: Snapshot) -> Result<ImportSummary> {
    backup::import_snapshot(&self.modern, snapshot).await
  }

  // ── Blob upgrade ────────────────────────────────────────────────────────

  /// Move inline references held in `field` of every `table` row into the
  /// file store, at `<table>/<id>.<ext>`.
  ///
  /// Rows whose upgrade fails keep their inline data. Nothing happens in
  /// inline fallback mode.
  pub async fn upgrade_inline_blobs(&self, table: &str, field: &str) -> Result<BlobUpgradeReport> {
    let mut report = BlobUpgradeReport::default();
    if !self.files.is_supported().await {
      tracing::warn!(table, "file storage unavailable, nothing to upgrade");
      return Ok(report);
    }

    for record in self.modern.select(table, None).await? {
      report.scanned += 1;
      let Some(Value::String(current)) = record.get(field) else {
        continue;
      };
      let Ok(blob @ BlobRef::Inline(_)) = BlobRef::parse(current) else {
        continue;
      };
      let ext = match blob.decode_inline() {
        Ok(Some((media_type, _))) => extension_for(&media_type),
        _ => "bin",
      };

      let target = format!("{}/{}.{ext}", path_segment(table), path_segment(&record.id));
      let upgraded = self.files.migrate_from_base64(current, &target).await;
      if upgraded == *current {
        report.kept += 1;
        continue;
      }

      let mut patch = Fields::new();
      patch.insert(field.to_owned(), Value::String(upgraded));
      self.modern.update(table, &record.id, patch).await?;
      report.upgraded += 1;
    }

    tracing::info!(table, field, upgraded = report.upgraded, kept = report.kept, "inline blobs upgraded");
    Ok(report)
  }
}

/// Make an id usable as a single path component.
/// Percent-encode everything but `[A-Za-z0-9_-]`, so distinct ids never
/// share a file name. The empty string maps to a lone `%`.
fn path_segment(s: &str) -> String {
  if s.is_empty() {
    return "%".into();
  }
  let mut out = String::with_capacity(s.len());
  for b in s.bytes() {
    if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
      out.push(char::from(b));
    } else {
      out.push_str(&format!("%{b:02X}"));
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn path_segments_are_flat() {
    assert_eq!(path_segment("a1b2-c3"), "a1b2-c3");
    assert_eq!(path_segment("../etc"), "%2E%2E%2Fetc");
    assert_eq!(path_segment("é"), "%C3%A9");
    assert_eq!(path_segment(""), "%");
  }

  #[test]
  fn path_segments_do_not_collide() {
    assert_ne!(path_segment("a.b"), path_segment("a_b"));
    assert_ne!(path_segment("a%2Eb"), path_segment("a.b"));
    assert_ne!(path_segment("%"), path_segment(""));
  }
}
