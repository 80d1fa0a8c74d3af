//! `sekolah`: maintenance commands for the Sekolah data directory.
//!
//! Reads `sekolah.toml` (or the path given with `--config`) layered with
//! `SEKOLAH_*` environment variables, opens the data directory and runs one
//! command against it.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use sekolah_storage::{
  Storage, StorageConfig,
  accountant::StorageData,
  backup::{read_snapshot, write_snapshot},
  migration::{MigrationOutcome, MigrationPlan, MigrationStatus},
};

#[derive(Parser)]
#[command(author, version, about = "Sekolah data maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sekolah.toml")]
  config: PathBuf,

  /// Override the configured data directory.
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Print machine-readable JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Show per-table migration status.
  Status,
  /// Run pending migrations.
  Migrate {
    /// Remove legacy tables that migrated completely.
    #[arg(long)]
    clear: bool,
  },
  /// Show how much space each storage area uses.
  Usage,
  /// Remove legacy keys whose data already lives in the record store.
  Cleanup {
    #[arg(long)]
    dry_run: bool,
  },
  /// Forget that a migration completed, so the next run re-checks counts.
  Reset {
    #[arg(value_enum, default_value_t = Plan::Core)]
    plan: Plan,
  },
  /// Write a JSON snapshot of every record.
  Export { file: PathBuf },
  /// Restore records from a snapshot, skipping ids already present.
  Import { file: PathBuf },
  /// Move inline blobs held in `field` of `table` into the file store.
  UpgradeBlobs { table: String, field: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Plan {
  Core,
  Ekskul,
}

impl From<Plan> for MigrationPlan {
  fn from(plan: Plan) -> Self {
    match plan {
      Plan::Core => MigrationPlan::CORE,
      Plan::Ekskul => MigrationPlan::EKSKUL,
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let mut config = load_config(&cli)?;
  if let Command::Migrate { clear: true } = cli.command {
    config.clear_legacy_after_migration = true;
  }

  let storage = Storage::open(&config)
    .await
    .with_context(|| format!("failed to open data directory {:?}", config.data_dir))?;

  match cli.command {
    Command::Status => {
      let mut statuses = Vec::new();
      for plan in [MigrationPlan::CORE, MigrationPlan::EKSKUL] {
        statuses.push(storage.migrator(plan).migration_status().await?);
      }
      if cli.json {
        print_json(&statuses)?;
      } else {
        statuses.iter().for_each(print_status);
      }
    }

    Command::Migrate { .. } => {
      let report = storage
        .initialize(|p| {
          if !cli.json {
            println!("[{:>3}%] {}", p.percent, p.message);
          }
        })
        .await
        .context("migration failed")?;
      if cli.json {
        print_json(&report)?;
      } else {
        for (name, outcome) in [("core", &report.core), ("ekskul", &report.ekskul)] {
          match outcome {
            MigrationOutcome::NotNeeded => println!("{name}: up to date"),
            MigrationOutcome::Completed(r) => println!(
              "{name}: {} copied, {} already present, {} failed",
              r.copied(),
              r.skipped(),
              r.failed()
            ),
          }
        }
        for key in &report.cleared.removed {
          println!("removed {key}");
        }
      }
    }

    Command::Usage => {
      let data = storage.accountant().calculate_storage_usage().await?;
      if cli.json {
        print_json(&data)?;
      } else {
        print_usage(&data);
      }
    }

    Command::Cleanup { dry_run } => {
      let accountant = storage.accountant();
      let data = accountant.calculate_storage_usage().await?;
      let keys = data.removable_keys();
      if keys.is_empty() {
        println!("nothing to clean up");
        return Ok(());
      }
      for key in &keys {
        println!("{} {key}", if dry_run { "would remove" } else { "removing" });
      }
      if !dry_run {
        let removed = accountant.cleanup_old_data(&keys).await?;
        println!("removed {removed} keys, freed {}", human_bytes(data.reclaimable_bytes()));
      }
    }

    Command::Reset { plan } => {
      let migrator = storage.migrator(plan.into());
      migrator.reset().await?;
      println!("{} migration marked as not completed", migrator.plan().name);
    }

    Command::Export { file } => {
      let snapshot = storage.export_snapshot().await?;
      write_snapshot(&snapshot, &file)
        .await
        .with_context(|| format!("failed to write {}", file.display()))?;
      println!("exported {} records to {}", snapshot.record_count(), file.display());
    }

    Command::Import { file } => {
      let snapshot = read_snapshot(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
      let summary = storage.import_snapshot(snapshot).await?;
      if cli.json {
        print_json(&summary)?;
      } else {
        println!("imported {} records, {} already present", summary.copied(), summary.skipped());
      }
    }

    Command::UpgradeBlobs { table, field } => {
      let report = storage.upgrade_inline_blobs(&table, &field).await?;
      if cli.json {
        print_json(&report)?;
      } else {
        println!(
          "{table}.{field}: {} rows scanned, {} upgraded, {} kept inline",
          report.scanned, report.upgraded, report.kept
        );
      }
    }
  }

  Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
  let mut builder = config::Config::builder()
    .add_source(config::File::from(cli.config.as_path()).required(false))
    .add_source(config::Environment::with_prefix("SEKOLAH").try_parsing(true));
  if let Some(dir) = &cli.data_dir {
    builder = builder.set_override("data_dir", dir.to_string_lossy().into_owned())?;
  }

  let mut config: StorageConfig = builder
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise StorageConfig")?;
  config.data_dir = expand_tilde(&config.data_dir);
  Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_status(status: &MigrationStatus) {
  let completed = status
    .completed_at
    .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339());
  println!("{} (completed: {completed})", status.plan);
  for t in &status.tables {
    let flag = if t.needs_migration { "pending" } else { "ok" };
    println!("  {:<20} legacy {:>6}  records {:>6}  {flag}", t.table, t.legacy_records, t.modern_records);
  }
}

fn print_usage(data: &StorageData) {
  let e = &data.estimate;
  println!(
    "total: {} of {} ({:.2}%)",
    human_bytes(e.usage_bytes),
    human_bytes(e.quota_bytes),
    e.percent_used
  );

  println!("\nrecord store: {}", human_bytes(data.modern_bytes()));
  for t in &data.modern {
    println!("  {:<20} {:>6} records  {:>10}", t.table, t.records, human_bytes(t.size_bytes));
  }

  println!("\nlegacy store: {}", human_bytes(data.legacy_bytes()));
  for item in &data.legacy {
    let mark = if item.should_remove {
      "removable"
    } else if item.is_whitelisted {
      "kept"
    } else {
      ""
    };
    println!(
      "  {:<28} {:>10}  {:<10} {}",
      item.key,
      human_bytes(item.size_bytes),
      mark,
      item.description
    );
  }

  println!("\nfiles: {} in {} files", human_bytes(data.files.bytes), data.files.files);
}

fn human_bytes(n: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
  let mut value = n as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  if unit == 0 { format!("{n} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn human_bytes_picks_a_unit() {
    assert_eq!(human_bytes(512), "512 B");
    assert_eq!(human_bytes(1536), "1.5 KiB");
    assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
  }

  #[test]
  fn cli_parses_subcommands() {
    let cli = Cli::try_parse_from(["sekolah", "--data-dir", "/tmp/x", "cleanup", "--dry-run"]).unwrap();
    assert!(matches!(cli.command, Command::Cleanup { dry_run: true }));
    assert_eq!(cli.data_dir.as_deref(), Some(Path::new("/tmp/x")));

    let cli = Cli::try_parse_from(["sekolah", "upgrade-blobs", "siswa", "foto"]).unwrap();
    assert!(matches!(cli.command, Command::UpgradeBlobs { ref table, .. } if table == "siswa"));
  }
}
