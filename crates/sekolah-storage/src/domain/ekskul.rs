//! Extracurricular activities: activities, members, attendance and grades.
//!
//! Every call goes through [`Ekskul`], which makes sure the extracurricular
//! tables have been moved out of legacy storage before touching them.
//! `Storage::initialize` normally does that up front; the façade covers
//! callers that skip it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use sekolah_core::{
  blob::BlobRef,
  record::Fields,
  tables::{ANGGOTA_EKSKUL, EKSTRAKURIKULER, KEHADIRAN_EKSKUL, NILAI_EKSKUL},
};

use super::{Entity, Stored, TypedTable};
use crate::{Result, Storage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ekstrakurikuler {
  pub nama:       String,
  /// Id of the supervising teacher (`guru`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pembina_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hari:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub jam:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deskripsi:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logo:       Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnggotaEkskul {
  pub ekskul_id:         String,
  pub siswa_id:          String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub jabatan:           Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tanggal_bergabung: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKehadiran {
  Hadir,
  Izin,
  Sakit,
  Alpa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KehadiranEkskul {
  pub ekskul_id:  String,
  pub siswa_id:   String,
  pub tanggal:    NaiveDate,
  pub status:     StatusKehadiran,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keterangan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NilaiEkskul {
  pub ekskul_id: String,
  pub siswa_id:  String,
  pub semester:  String,
  /// Letter grade, e.g. `"A"`.
  pub predikat:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deskripsi: Option<String>,
}

impl Entity for Ekstrakurikuler {
  const TABLE: &'static str = EKSTRAKURIKULER;
}

impl Entity for AnggotaEkskul {
  const TABLE: &'static str = ANGGOTA_EKSKUL;
}

impl Entity for KehadiranEkskul {
  const TABLE: &'static str = KEHADIRAN_EKSKUL;
}

impl Entity for NilaiEkskul {
  const TABLE: &'static str = NILAI_EKSKUL;
}

/// Entities the [`Ekskul`] façade is allowed to reach.
pub trait EkskulEntity: Entity + sealed::Sealed {}

impl EkskulEntity for Ekstrakurikuler {}
impl EkskulEntity for AnggotaEkskul {}
impl EkskulEntity for KehadiranEkskul {}
impl EkskulEntity for NilaiEkskul {}

mod sealed {
  pub trait Sealed {}

  impl Sealed for super::Ekstrakurikuler {}
  impl Sealed for super::AnggotaEkskul {}
  impl Sealed for super::KehadiranEkskul {}
  impl Sealed for super::NilaiEkskul {}
}

/// Façade over the four extracurricular tables.
pub struct Ekskul<'s> {
  storage: &'s Storage,
}

impl<'s> Ekskul<'s> {
  pub fn new(storage: &'s Storage) -> Self { Self { storage } }

  async fn table<T: EkskulEntity>(&self) -> Result<TypedTable<'s, T>> {
    self.storage.ensure_ekskul_migrated().await?;
    Ok(self.storage.table::<T>())
  }

  pub async fn all<T: EkskulEntity>(&self) -> Result<Vec<Stored<T>>> {
    self.table::<T>().await?.all().await
  }

  pub async fn get<T: EkskulEntity>(&self, id: &str) -> Result<Option<Stored<T>>> {
    self.table::<T>().await?.get(id).await
  }

  pub async fn create<T: EkskulEntity>(&self, value: &T) -> Result<Stored<T>> {
    self.table::<T>().await?.create(value).await
  }

  pub async fn update<T: EkskulEntity>(&self, id: &str, patch: Fields) -> Result<Stored<T>> {
    self.table::<T>().await?.update(id, patch).await
  }

  pub async fn remove<T: EkskulEntity>(&self, id: &str) -> Result<()> {
    self.table::<T>().await?.remove(id).await
  }

  pub async fn count<T: EkskulEntity>(&self) -> Result<usize> {
    self.table::<T>().await?.count().await
  }

  pub async fn activities(&self) -> Result<Vec<Stored<Ekstrakurikuler>>> {
    self.all::<Ekstrakurikuler>().await
  }

  pub async fn members_of(&self, ekskul_id: &str) -> Result<Vec<Stored<AnggotaEkskul>>> {
    self
      .table::<AnggotaEkskul>()
      .await?
      .filter(|m| m.ekskul_id == ekskul_id)
      .await
  }

  pub async fn attendance_on(
    &self,
    ekskul_id: &str,
    tanggal: NaiveDate,
  ) -> Result<Vec<Stored<KehadiranEkskul>>> {
    self
      .table::<KehadiranEkskul>()
      .await?
      .filter(|k| k.ekskul_id == ekskul_id && k.tanggal == tanggal)
      .await
  }

  pub async fn grades_of(&self, ekskul_id: &str, semester: &str) -> Result<Vec<Stored<NilaiEkskul>>> {
    self
      .table::<NilaiEkskul>()
      .await?
      .filter(|n| n.ekskul_id == ekskul_id && n.semester == semester)
      .await
  }
}
