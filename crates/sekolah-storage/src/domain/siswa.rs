//! Students.

use serde::{Deserialize, Serialize};

use sekolah_core::{blob::BlobRef, tables::SISWA};

use super::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Siswa {
  pub nama_siswa:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nis:           Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kelas_id:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub jenis_kelamin: Option<String>,
  /// Photo, either inline or in the file store.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub foto:          Option<BlobRef>,
}

impl Siswa {
  pub fn new(nama_siswa: impl Into<String>) -> Self {
    Self { nama_siswa: nama_siswa.into(), nis: None, kelas_id: None, jenis_kelamin: None, foto: None }
  }
}

impl Entity for Siswa {
  const TABLE: &'static str = SISWA;
}
