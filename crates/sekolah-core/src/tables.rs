//! The closed catalogue of table names and flat-storage keys.
//!
//! Every page of the application reads and writes one of these tables.
//! Legacy table blobs live under `LEGACY_PREFIX + table` in the flat store.

pub const LEGACY_PREFIX: &str = "sekolah_";

/// Completion sentinel for the core migration plan.
pub const MIGRATION_SENTINEL_KEY: &str = "migrationCompleted";

/// Completion sentinel for the extracurricular sub-migration.
pub const EKSKUL_SENTINEL_KEY: &str = "ekskulMigrationCompleted";

/// Application settings. Small enough to stay in flat storage for good.
pub const SETTINGS_TABLE: &str = "pengaturan";

pub const PENGGUNA: &str = "pengguna";
pub const GURU: &str = "guru";
pub const KELAS: &str = "kelas";
pub const SISWA: &str = "siswa";
pub const MATA_PELAJARAN: &str = "mata_pelajaran";
pub const JADWAL: &str = "jadwal";
pub const KEHADIRAN: &str = "kehadiran";
pub const NILAI: &str = "nilai";
pub const JURNAL_MENGAJAR: &str = "jurnal_mengajar";
pub const KALENDER: &str = "kalender";
pub const CATATAN_SISWA: &str = "catatan_siswa";

pub const EKSTRAKURIKULER: &str = "ekstrakurikuler";
pub const ANGGOTA_EKSKUL: &str = "anggota_ekskul";
pub const KEHADIRAN_EKSKUL: &str = "kehadiran_ekskul";
pub const NILAI_EKSKUL: &str = "nilai_ekskul";

/// Tables moved by the core migration, in migration order.
pub const CORE_TABLES: &[&str] = &[
  PENGGUNA,
  GURU,
  KELAS,
  SISWA,
  MATA_PELAJARAN,
  JADWAL,
  KEHADIRAN,
  NILAI,
  JURNAL_MENGAJAR,
  KALENDER,
  CATATAN_SISWA,
];

/// Tables moved lazily by the extracurricular façade.
pub const EKSKUL_TABLES: &[&str] =
  &[EKSTRAKURIKULER, ANGGOTA_EKSKUL, KEHADIRAN_EKSKUL, NILAI_EKSKUL];

/// Flat-storage keys that stay put permanently and are never reported as
/// removable.
pub const WHITELISTED_KEYS: &[&str] = &[
  MIGRATION_SENTINEL_KEY,
  EKSKUL_SENTINEL_KEY,
  "sekolah_pengaturan",
  "theme",
  "sidebar_collapsed",
  "filter_preferences",
];

/// Flat-storage key holding the legacy blob of `table`.
pub fn legacy_key(table: &str) -> String { format!("{LEGACY_PREFIX}{table}") }

/// Inverse of [`legacy_key`]. `None` if `key` does not follow the pattern.
pub fn table_from_legacy_key(key: &str) -> Option<&str> {
  key.strip_prefix(LEGACY_PREFIX).filter(|t| !t.is_empty())
}

pub fn is_whitelisted(key: &str) -> bool { WHITELISTED_KEYS.contains(&key) }

/// Whether `table` belongs to the closed catalogue.
pub fn is_known_table(table: &str) -> bool {
  table == SETTINGS_TABLE || CORE_TABLES.contains(&table) || EKSKUL_TABLES.contains(&table)
}

/// Human-readable label for a known table.
pub fn describe_table(table: &str) -> Option<&'static str> {
  Some(match table {
    PENGGUNA => "user accounts",
    GURU => "teachers",
    KELAS => "classes",
    SISWA => "students",
    MATA_PELAJARAN => "subjects",
    JADWAL => "timetable",
    KEHADIRAN => "attendance",
    NILAI => "grades",
    JURNAL_MENGAJAR => "teaching journal",
    KALENDER => "academic calendar",
    CATATAN_SISWA => "student notes",
    EKSTRAKURIKULER => "extracurricular activities",
    ANGGOTA_EKSKUL => "extracurricular members",
    KEHADIRAN_EKSKUL => "extracurricular attendance",
    NILAI_EKSKUL => "extracurricular grades",
    SETTINGS_TABLE => "application settings",
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn legacy_key_round_trips() {
    let key = legacy_key(KEHADIRAN);
    assert_eq!(key, "sekolah_kehadiran");
    assert_eq!(table_from_legacy_key(&key), Some(KEHADIRAN));
    assert_eq!(table_from_legacy_key("theme"), None);
    assert_eq!(table_from_legacy_key(LEGACY_PREFIX), None);
  }

  #[test]
  fn settings_table_key_is_whitelisted() {
    assert!(is_whitelisted(&legacy_key(SETTINGS_TABLE)));
    assert!(is_whitelisted(MIGRATION_SENTINEL_KEY));
    assert!(!is_whitelisted(&legacy_key(SISWA)));
  }

  #[test]
  fn plans_do_not_overlap() {
    for t in EKSKUL_TABLES {
      assert!(!CORE_TABLES.contains(t));
    }
    assert!(CORE_TABLES.iter().chain(EKSKUL_TABLES).all(|t| describe_table(t).is_some()));
    assert!(is_known_table(SETTINGS_TABLE));
  }
}
