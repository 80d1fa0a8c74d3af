//! Typed tables, the extracurricular façade and inline blob upgrades.

use chrono::NaiveDate;
use serde_json::json;

use sekolah_core::{
  blob::BlobRef,
  store::RecordStore,
  tables::{EKSKUL_SENTINEL_KEY, legacy_key},
};
use sekolah_storage::{
  Storage,
  domain::{
    Siswa,
    ekskul::{AnggotaEkskul, Ekstrakurikuler, KehadiranEkskul, NilaiEkskul, StatusKehadiran},
  },
};

fn date(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 8, d).unwrap() }

fn pramuka() -> Ekstrakurikuler {
  Ekstrakurikuler {
    nama:       "Pramuka".into(),
    pembina_id: Some("g1".into()),
    hari:       Some("Jumat".into()),
    jam:        None,
    deskripsi:  None,
    logo:       None,
  }
}

fn hadir(ekskul_id: &str, siswa_id: &str, tanggal: NaiveDate, status: StatusKehadiran) -> KehadiranEkskul {
  KehadiranEkskul {
    ekskul_id: ekskul_id.into(),
    siswa_id: siswa_id.into(),
    tanggal,
    status,
    keterangan: None,
  }
}

// ─── Typed tables ────────────────────────────────────────────────────────────

#[tokio::test]
async fn siswa_typed_round_trip() {
  let storage = Storage::open_in_memory().await.unwrap();
  let table = storage.table::<Siswa>();

  let created = table.create(&Siswa::new("Ahmad")).await.unwrap();
  assert_eq!(created.id.len(), 36);
  assert_eq!(created.created_at, created.updated_at);
  assert_eq!(created.nama_siswa, "Ahmad");

  let patch = json!({ "nama_siswa": "Ahmad Fajar" }).as_object().cloned().unwrap();
  let updated = table.update(&created.id, patch).await.unwrap();
  assert!(updated.updated_at > updated.created_at);
  assert_eq!(updated.nama_siswa, "Ahmad Fajar");

  let found = table.find(|s| s.nama_siswa.starts_with("Ahmad")).await.unwrap().unwrap();
  assert_eq!(found, updated);
  assert_eq!(table.count().await.unwrap(), 1);

  table.remove(&created.id).await.unwrap();
  assert!(table.get(&created.id).await.unwrap().is_none());
  assert!(table.remove(&created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
  let storage = Storage::open_in_memory().await.unwrap();
  let raw = json!({ "tanpa_nama": true }).as_object().cloned().unwrap();
  storage.modern().insert("siswa", raw).await.unwrap();
  storage.table::<Siswa>().create(&Siswa::new("Budi")).await.unwrap();

  let rows = storage.table::<Siswa>().all().await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].nama_siswa, "Budi");
}

// ─── Extracurricular façade ──────────────────────────────────────────────────

#[tokio::test]
async fn first_access_migrates_legacy_ekskul_tables() {
  let storage = Storage::open_in_memory().await.unwrap();
  storage
    .legacy()
    .set_item(&legacy_key("ekstrakurikuler"), &json!([{ "id": "e1", "nama": "Pramuka" }]).to_string())
    .await
    .unwrap();
  storage
    .legacy()
    .set_item(
      &legacy_key("anggota_ekskul"),
      &json!([{ "id": "a1", "ekskul_id": "e1", "siswa_id": "s1" }]).to_string(),
    )
    .await
    .unwrap();

  let ekskul = storage.ekskul();
  let activities = ekskul.activities().await.unwrap();
  assert_eq!(activities.len(), 1);
  assert_eq!(activities[0].id, "e1");
  assert_eq!(activities[0].nama, "Pramuka");

  assert_eq!(ekskul.members_of("e1").await.unwrap().len(), 1);
  assert!(storage.legacy().get_item(EKSKUL_SENTINEL_KEY).await.unwrap().is_some());
  assert_eq!(storage.modern().count("anggota_ekskul", None).await.unwrap(), 1);
}

#[tokio::test]
async fn ekskul_crud_and_queries() {
  let storage = Storage::open_in_memory().await.unwrap();
  let ekskul = storage.ekskul();

  let activity = ekskul.create(&pramuka()).await.unwrap();
  let other = ekskul.create(&Ekstrakurikuler { nama: "Futsal".into(), ..pramuka() }).await.unwrap();

  for siswa in ["s1", "s2"] {
    ekskul
      .create(&AnggotaEkskul {
        ekskul_id:         activity.id.clone(),
        siswa_id:          siswa.into(),
        jabatan:           None,
        tanggal_bergabung: Some(date(1)),
      })
      .await
      .unwrap();
  }
  ekskul
    .create(&AnggotaEkskul {
      ekskul_id:         other.id.clone(),
      siswa_id:          "s3".into(),
      jabatan:           Some("ketua".into()),
      tanggal_bergabung: None,
    })
    .await
    .unwrap();
  assert_eq!(ekskul.members_of(&activity.id).await.unwrap().len(), 2);

  ekskul.create(&hadir(&activity.id, "s1", date(2), StatusKehadiran::Hadir)).await.unwrap();
  ekskul.create(&hadir(&activity.id, "s2", date(2), StatusKehadiran::Izin)).await.unwrap();
  ekskul.create(&hadir(&activity.id, "s1", date(9), StatusKehadiran::Alpa)).await.unwrap();
  let on_second = ekskul.attendance_on(&activity.id, date(2)).await.unwrap();
  assert_eq!(on_second.len(), 2);
  assert_eq!(on_second[1].status, StatusKehadiran::Izin);

  let grade = ekskul
    .create(&NilaiEkskul {
      ekskul_id: activity.id.clone(),
      siswa_id:  "s1".into(),
      semester:  "2024/1".into(),
      predikat:  "B".into(),
      deskripsi: None,
    })
    .await
    .unwrap();
  let patch = json!({ "predikat": "A" }).as_object().cloned().unwrap();
  let regraded = ekskul.update::<NilaiEkskul>(&grade.id, patch).await.unwrap();
  assert_eq!(regraded.predikat, "A");
  assert_eq!(ekskul.grades_of(&activity.id, "2024/1").await.unwrap().len(), 1);

  ekskul.remove::<Ekstrakurikuler>(&other.id).await.unwrap();
  assert_eq!(ekskul.count::<Ekstrakurikuler>().await.unwrap(), 1);
  assert!(ekskul.get::<Ekstrakurikuler>(&other.id).await.unwrap().is_none());
}

// ─── Inline blob upgrade ─────────────────────────────────────────────────────

#[tokio::test]
async fn inline_photos_move_to_files() {
  let dir = tempfile::tempdir().unwrap();
  let storage = Storage::open_in_memory().await.unwrap().with_file_root(dir.path());
  let photo = vec![7u8; 32];

  let table = storage.table::<Siswa>();
  let with_photo = table
    .create(&Siswa { foto: Some(BlobRef::inline("image/jpeg", &photo)), ..Siswa::new("Citra") })
    .await
    .unwrap();
  let without = table.create(&Siswa::new("Dodi")).await.unwrap();

  let report = storage.upgrade_inline_blobs("siswa", "foto").await.unwrap();
  assert_eq!((report.scanned, report.upgraded, report.kept), (2, 1, 0));

  let stored = table.get(&with_photo.id).await.unwrap().unwrap();
  let expected = format!("siswa/{}.jpg", with_photo.id);
  assert_eq!(stored.foto, Some(BlobRef::Path(expected.clone())));
  assert_eq!(std::fs::read(dir.path().join(expected)).unwrap(), photo);
  assert!(table.get(&without.id).await.unwrap().unwrap().foto.is_none());

  let again = storage.upgrade_inline_blobs("siswa", "foto").await.unwrap();
  assert_eq!(again.upgraded, 0);
}

#[tokio::test]
async fn similar_ids_get_separate_files() {
  let dir = tempfile::tempdir().unwrap();
  let storage = Storage::open_in_memory().await.unwrap().with_file_root(dir.path());
  for (id, byte) in [("a.b", 1u8), ("a_b", 2u8)] {
    let foto = BlobRef::inline("image/png", &[byte; 4]).to_string();
    let row = json!({ "id": id, "nama_siswa": id, "foto": foto });
    storage.modern().insert("siswa", row.as_object().cloned().unwrap()).await.unwrap();
  }

  let report = storage.upgrade_inline_blobs("siswa", "foto").await.unwrap();
  assert_eq!((report.scanned, report.upgraded, report.kept), (2, 2, 0));

  let mut paths = Vec::new();
  for (id, byte) in [("a.b", 1u8), ("a_b", 2u8)] {
    let row = storage.table::<Siswa>().get(id).await.unwrap().unwrap();
    let Some(BlobRef::Path(path)) = row.foto.clone() else {
      panic!("{id} was not upgraded: {:?}", row.foto);
    };
    assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), [byte; 4]);
    paths.push(path);
  }
  assert_ne!(paths[0], paths[1]);
}

#[tokio::test]
async fn upgrade_is_a_no_op_without_file_storage() {
  let storage = Storage::open_in_memory().await.unwrap();
  let inline = BlobRef::inline("image/png", &[1, 2, 3]);
  storage
    .table::<Siswa>()
    .create(&Siswa { foto: Some(inline.clone()), ..Siswa::new("Eka") })
    .await
    .unwrap();

  let report = storage.upgrade_inline_blobs("siswa", "foto").await.unwrap();
  assert_eq!(report.upgraded, 0);
  let rows = storage.table::<Siswa>().all().await.unwrap();
  assert_eq!(rows[0].foto, Some(inline));
}
