//! One-directional, idempotent migration from the legacy flat store into a
//! structured [`RecordStore`].
//!
//! A run copies every table of a [`MigrationPlan`] record by record. Each
//! record is looked up by id in the destination first and skipped when
//! present, which is what makes a run safe to repeat after a partial
//! failure. Legacy data is only ever removed by [`Migrator::clear_legacy_data`],
//! which requires the report of a finished run.

use std::{collections::HashSet, sync::Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sekolah_core::{
  record::Record,
  store::RecordStore,
  tables::{
    CORE_TABLES, EKSKUL_SENTINEL_KEY, EKSKUL_TABLES, MIGRATION_SENTINEL_KEY, is_whitelisted,
    legacy_key,
  },
};
use sekolah_store_flat::FlatStore;

use crate::{Error, Result};

// ─── Plans ───────────────────────────────────────────────────────────────────

/// Which tables a migration moves and where its completion sentinel lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationPlan {
  pub name:         &'static str,
  pub tables:       &'static [&'static str],
  pub sentinel_key: &'static str,
}

impl MigrationPlan {
  pub const CORE: Self = Self {
    name:         "core",
    tables:       CORE_TABLES,
    sentinel_key: MIGRATION_SENTINEL_KEY,
  };

  pub const EKSKUL: Self = Self {
    name:         "ekskul",
    tables:       EKSKUL_TABLES,
    sentinel_key: EKSKUL_SENTINEL_KEY,
  };
}

// ─── State and reports ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
  NotStarted,
  Checking,
  Needed,
  NotNeeded,
  Running,
  Succeeded,
  Failed,
}

/// Emitted after each table of a run completes.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationProgress {
  /// Strictly increasing over a run, reaching 100 on the last table.
  pub percent: u8,
  pub table:   &'static str,
  pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
  pub id:      String,
  pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
  pub table:          &'static str,
  pub legacy_records: usize,
  pub copied:         usize,
  /// Already present in the destination.
  pub skipped:        usize,
  pub failed:         usize,
  pub failures:       Vec<RecordFailure>,
}

impl TableReport {
  /// Every legacy record is now present in the destination.
  pub fn is_complete(&self) -> bool { self.failed == 0 }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
  pub plan:        &'static str,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub tables:      Vec<TableReport>,
}

impl MigrationReport {
  pub fn is_complete(&self) -> bool { self.tables.iter().all(TableReport::is_complete) }

  pub fn copied(&self) -> usize { self.tables.iter().map(|t| t.copied).sum() }

  pub fn skipped(&self) -> usize { self.tables.iter().map(|t| t.skipped).sum() }

  pub fn failed(&self) -> usize { self.tables.iter().map(|t| t.failed).sum() }

  pub fn table(&self, name: &str) -> Option<&TableReport> {
    self.tables.iter().find(|t| t.table == name)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
  pub table:           &'static str,
  pub legacy_records:  usize,
  pub modern_records:  usize,
  pub needs_migration: bool,
}

/// Ground-truth migration state, computed from record counts.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
  pub plan:         &'static str,
  /// Timestamp held by the completion sentinel, if set.
  pub completed_at: Option<DateTime<Utc>>,
  pub tables:       Vec<TableStatus>,
}

impl MigrationStatus {
  pub fn is_needed(&self) -> bool { self.tables.iter().any(|t| t.needs_migration) }
}

/// Result of [`Migrator::run_if_needed`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
  NotNeeded,
  Completed(MigrationReport),
}

impl MigrationOutcome {
  pub fn report(&self) -> Option<&MigrationReport> {
    match self {
      Self::NotNeeded => None,
      Self::Completed(report) => Some(report),
    }
  }
}

/// Keys removed and kept by [`Migrator::clear_legacy_data`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearSummary {
  pub removed: Vec<String>,
  pub kept:    Vec<String>,
}

// ─── Migrator ────────────────────────────────────────────────────────────────

/// Runs one [`MigrationPlan`] from a [`FlatStore`] into `M`.
pub struct Migrator<'s, M> {
  legacy: &'s FlatStore,
  modern: &'s M,
  plan:   MigrationPlan,
  phase:  Mutex<MigrationPhase>,
}

impl<'s, M: RecordStore> Migrator<'s, M> {
  pub fn new(legacy: &'s FlatStore, modern: &'s M, plan: MigrationPlan) -> Self {
    Self { legacy, modern, plan, phase: Mutex::new(MigrationPhase::NotStarted) }
  }

  pub fn plan(&self) -> MigrationPlan { self.plan }

  pub fn phase(&self) -> MigrationPhase {
    *self.phase.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_phase(&self, phase: MigrationPhase) {
    tracing::info!(plan = self.plan.name, ?phase, "migration phase");
    *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
  }

  fn fatal(&self, message: impl Into<String>) -> Error {
    self.set_phase(MigrationPhase::Failed);
    let message = message.into();
    tracing::error!(plan = self.plan.name, %message, "migration aborted");
    Error::MigrationFatal { plan: self.plan.name, message }
  }

  // ── Status ────────────────────────────────────────────────────────────────

  /// When the sentinel says this plan last completed. An unparseable value
  /// is treated as absent so the counts get consulted instead.
  pub async fn completed_at(&self) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = self.legacy.get_item(self.plan.sentinel_key).await? else {
      return Ok(None);
    };
    match DateTime::parse_from_rfc3339(&raw) {
      Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
      Err(e) => {
        tracing::warn!(key = self.plan.sentinel_key, error = %e, "ignoring unparseable sentinel");
        Ok(None)
      }
    }
  }

  /// Per-table counts in both stores. Never takes the sentinel fast path.
  pub async fn migration_status(&self) -> Result<MigrationStatus> {
    let completed_at = self.completed_at().await?;
    let mut tables = Vec::with_capacity(self.plan.tables.len());

    for &table in self.plan.tables {
      let legacy_records = self.legacy.count(table, None).await?;
      let modern_records = self
        .modern
        .count(table, None)
        .await
        .map_err(|e| Error::MigrationFatal { plan: self.plan.name, message: e.to_string() })?;
      tables.push(TableStatus {
        table,
        legacy_records,
        modern_records,
        needs_migration: legacy_records > modern_records,
      });
    }

    Ok(MigrationStatus { plan: self.plan.name, completed_at, tables })
  }

  /// Whether any legacy table holds more records than its destination.
  ///
  /// A set sentinel answers `false` without looking at either store. The
  /// sentinel is never re-validated: if the destination is wiped afterwards
  /// this keeps answering `false` until [`Migrator::reset`] is called.
  pub async fn is_migration_needed(&self) -> Result<bool> {
    if self.completed_at().await?.is_some() {
      return Ok(false);
    }
    Ok(self.migration_status().await?.is_needed())
  }

  // ── Running ───────────────────────────────────────────────────────────────

  /// Check, then migrate only when needed.
  pub async fn run_if_needed(
    &self,
    on_progress: impl FnMut(&MigrationProgress),
  ) -> Result<MigrationOutcome> {
    self.set_phase(MigrationPhase::Checking);
    let needed = match self.is_migration_needed().await {
      Ok(needed) => needed,
      Err(e) => {
        self.set_phase(MigrationPhase::Failed);
        return Err(e);
      }
    };

    if !needed {
      self.set_phase(MigrationPhase::NotNeeded);
      return Ok(MigrationOutcome::NotNeeded);
    }

    self.set_phase(MigrationPhase::Needed);
    self.migrate(on_progress).await.map(MigrationOutcome::Completed)
  }

  /// Copy every table of the plan into the destination.
  ///
  /// Records already present (by id) are skipped. A record that fails to
  /// copy is logged and counted but does not stop the run; only failing to
  /// reach either store is fatal. The sentinel is written when no record
  /// failed.
  pub async fn migrate(
    &self,
    mut on_progress: impl FnMut(&MigrationProgress),
  ) -> Result<MigrationReport> {
    self.set_phase(MigrationPhase::Running);
    let started_at = Utc::now();

    if let Err(e) = self.modern.tables().await {
      return Err(self.fatal(format!("cannot open destination store: {e}")));
    }

    let total = self.plan.tables.len().max(1);
    let mut tables = Vec::with_capacity(self.plan.tables.len());

    for (index, &table) in self.plan.tables.iter().enumerate() {
      let records = match self.legacy.select(table, None).await {
        Ok(records) => records,
        Err(e) => return Err(self.fatal(format!("cannot read legacy table {table}: {e}"))),
      };

      let report = self.migrate_table(table, records).await;

      let progress = MigrationProgress {
        percent: ((index + 1) * 100 / total) as u8,
        table,
        message: format!(
          "{table}: {} copied, {} already present, {} failed",
          report.copied, report.skipped, report.failed
        ),
      };
      tracing::info!(plan = self.plan.name, percent = progress.percent, "{}", progress.message);
      on_progress(&progress);
      tables.push(report);
    }

    let report = MigrationReport {
      plan: self.plan.name,
      started_at,
      finished_at: Utc::now(),
      tables,
    };

    if report.is_complete() {
      let stamp = report.finished_at.to_rfc3339();
      if let Err(e) = self.legacy.set_item(self.plan.sentinel_key, &stamp).await {
        tracing::warn!(plan = self.plan.name, error = %e, "could not write completion sentinel");
      }
    } else {
      tracing::warn!(
        plan = self.plan.name,
        failed = report.failed(),
        "migration finished with record failures; sentinel not written"
      );
    }

    self.set_phase(MigrationPhase::Succeeded);
    Ok(report)
  }

  async fn migrate_table(&self, table: &'static str, records: Vec<Record>) -> TableReport {
    let mut report = TableReport {
      table,
      legacy_records: records.len(),
      copied: 0,
      skipped: 0,
      failed: 0,
      failures: Vec::new(),
    };

    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
      let id = record.id.clone();
      // A repeated id would be counted as already present and lost on clear.
      if !seen.insert(id.clone()) {
        let message = "duplicate id in legacy table".to_owned();
        tracing::warn!(table, id = %id, "duplicate id in legacy table");
        report.failed += 1;
        report.failures.push(RecordFailure { id, message });
        continue;
      }
      match self.copy_record(table, record).await {
        Ok(true) => report.copied += 1,
        Ok(false) => report.skipped += 1,
        Err(message) => {
          tracing::warn!(table, id = %id, %message, "failed to migrate record");
          report.failed += 1;
          report.failures.push(RecordFailure { id, message });
        }
      }
    }

    report
  }

  /// Returns `Ok(false)` when the record already exists in the destination.
  async fn copy_record(&self, table: &str, record: Record) -> Result<bool, String> {
    match self.modern.select_by_id(table, &record.id).await {
      Ok(Some(_)) => Ok(false),
      Ok(None) => self
        .modern
        .restore(table, record)
        .await
        .map(|()| true)
        .map_err(|e| e.to_string()),
      Err(e) => Err(e.to_string()),
    }
  }

  // ── Cleanup ───────────────────────────────────────────────────────────────

  /// Remove the legacy blob of every table `report` shows fully migrated.
  ///
  /// Tables with failed records and whitelisted keys are kept.
  pub async fn clear_legacy_data(&self, report: &MigrationReport) -> Result<ClearSummary> {
    let mut summary = ClearSummary::default();

    for table in &report.tables {
      let key = legacy_key(table.table);
      if is_whitelisted(&key) || !table.is_complete() {
        if !table.is_complete() {
          tracing::warn!(table = table.table, failed = table.failed, "keeping legacy table");
        }
        summary.kept.push(key);
        continue;
      }
      if self.legacy.remove_item(&key).await? {
        tracing::info!(key = %key, "removed migrated legacy table");
        summary.removed.push(key);
      }
    }

    Ok(summary)
  }

  /// Forget that this plan ever completed.
  pub async fn reset(&self) -> Result<()> {
    self.legacy.remove_item(self.plan.sentinel_key).await?;
    self.set_phase(MigrationPhase::NotStarted);
    Ok(())
  }
}
