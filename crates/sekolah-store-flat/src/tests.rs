//! Integration tests for `FlatStore` against an in-memory database.

use serde_json::{Value, json};

use sekolah_core::{record::Fields, store::RecordStore, tables::legacy_key};

use crate::{Error, FlatStore};

async fn store() -> FlatStore {
  FlatStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn fields(v: Value) -> Fields { v.as_object().cloned().unwrap() }

// ─── Key space ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_get_remove_item() {
  let s = store().await;
  assert_eq!(s.get_item("theme").await.unwrap(), None);

  s.set_item("theme", "dark").await.unwrap();
  assert_eq!(s.get_item("theme").await.unwrap().as_deref(), Some("dark"));

  s.set_item("theme", "light").await.unwrap();
  assert_eq!(s.get_item("theme").await.unwrap().as_deref(), Some("light"));

  assert!(s.remove_item("theme").await.unwrap());
  assert!(!s.remove_item("theme").await.unwrap());
}

#[tokio::test]
async fn used_bytes_counts_keys_and_values() {
  let s = store().await;
  s.set_item("ab", "cde").await.unwrap();
  s.set_item("é", "x").await.unwrap();
  assert_eq!(s.used_bytes().await.unwrap(), 5 + 3);
}

#[tokio::test]
async fn writes_past_capacity_are_rejected() {
  let s = FlatStore::open_in_memory_with_capacity(16).await.unwrap();
  s.set_item("k", "0123456789").await.unwrap();

  let err = s.set_item("other", "0123456789").await.unwrap_err();
  assert!(matches!(err, Error::QuotaExceeded { capacity: 16, .. }));
  assert_eq!(s.get_item("other").await.unwrap(), None);

  // Overwriting an existing key only counts the new value.
  s.set_item("k", "012345678901234").await.unwrap();
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_persists_whole_table_blob() {
  let s = store().await;
  let a = s.insert("siswa", fields(json!({ "nama_siswa": "Ahmad" }))).await.unwrap();
  s.insert("siswa", fields(json!({ "nama_siswa": "Budi" }))).await.unwrap();

  let raw = s.get_item(&legacy_key("siswa")).await.unwrap().unwrap();
  let blob: Vec<Value> = serde_json::from_str(&raw).unwrap();
  assert_eq!(blob.len(), 2);
  assert_eq!(blob[0]["id"], json!(a.id));
  assert_eq!(blob[0]["nama_siswa"], json!("Ahmad"));
}

#[tokio::test]
async fn select_preserves_insertion_order_and_filters() {
  let s = store().await;
  for n in ["C", "A", "B"] {
    s.insert("kelas", fields(json!({ "nama": n }))).await.unwrap();
  }
  let all = s.select("kelas", None).await.unwrap();
  let names: Vec<_> = all.iter().filter_map(|r| r.get_str("nama")).collect();
  assert_eq!(names, ["C", "A", "B"]);

  let only_a = |r: &sekolah_core::record::Record| r.get_str("nama") == Some("A");
  assert_eq!(s.select("kelas", Some(&only_a)).await.unwrap().len(), 1);
  assert_eq!(s.count("kelas", Some(&only_a)).await.unwrap(), 1);
  assert_eq!(s.count("kelas", None).await.unwrap(), 3);
}

#[tokio::test]
async fn update_and_delete_missing_record() {
  let s = store().await;
  let err = s.update("siswa", "nope", Fields::new()).await.unwrap_err();
  assert_eq!(err.to_string(), "Record not found");

  let err = s.delete("siswa", "nope").await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn update_merges_and_delete_removes() {
  let s = store().await;
  let r = s
    .insert("guru", fields(json!({ "nama": "Sari", "mapel": "IPA" })))
    .await
    .unwrap();

  let updated = s.update("guru", &r.id, fields(json!({ "mapel": "Fisika" }))).await.unwrap();
  assert_eq!(updated.get_str("nama"), Some("Sari"));
  assert_eq!(updated.get_str("mapel"), Some("Fisika"));
  assert!(updated.updated_at > updated.created_at);

  s.delete("guru", &r.id).await.unwrap();
  assert!(s.select_by_id("guru", &r.id).await.unwrap().is_none());
  assert!(s.delete("guru", &r.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
  let s = store().await;
  s.insert("siswa", fields(json!({ "id": "s1" }))).await.unwrap();
  let err = s.insert("siswa", fields(json!({ "id": "s1" }))).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateId(id) if id == "s1"));
}

#[tokio::test]
async fn corrupt_blob_reads_as_empty_table() {
  let s = store().await;
  s.set_item(&legacy_key("nilai"), "{not json").await.unwrap();
  assert!(s.select("nilai", None).await.unwrap().is_empty());
  assert_eq!(s.count("nilai", None).await.unwrap(), 0);
}

#[tokio::test]
async fn legacy_rows_are_normalised_on_read() {
  let s = store().await;
  s.set_item(
    &legacy_key("kehadiran"),
    r#"[{"id": 17, "status": "hadir"}, {"status": "izin"}, "garbage"]"#,
  )
  .await
  .unwrap();

  let rows = s.select("kehadiran", None).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].id, "17");
  assert_eq!(rows[1].id.len(), 36);

  // The derived id is stable across reads.
  let again = s.select("kehadiran", None).await.unwrap();
  assert_eq!(again[1].id, rows[1].id);
}

#[tokio::test]
async fn tables_and_export_only_cover_prefixed_keys() {
  let s = store().await;
  s.set_item("theme", "dark").await.unwrap();
  s.insert("siswa", fields(json!({ "nama": "A" }))).await.unwrap();
  s.insert("jadwal", fields(json!({ "hari": "Senin" }))).await.unwrap();

  let tables = s.tables().await.unwrap();
  assert_eq!(tables, ["jadwal", "siswa"]);

  let snapshot = s.export_all().await.unwrap();
  assert_eq!(snapshot.len(), 2);
  assert_eq!(snapshot["siswa"].len(), 1);

  assert!(s.remove_table("siswa").await.unwrap());
  assert_eq!(s.tables().await.unwrap(), ["jadwal"]);
}

#[tokio::test]
async fn quota_failure_leaves_table_unchanged() {
  let s = FlatStore::open_in_memory_with_capacity(200).await.unwrap();
  s.insert("siswa", fields(json!({ "nama": "A" }))).await.unwrap();

  let big = "x".repeat(500);
  let err = s.insert("siswa", fields(json!({ "nama": big }))).await.unwrap_err();
  assert!(matches!(err, Error::QuotaExceeded { .. }));
  assert_eq!(s.count("siswa", None).await.unwrap(), 1);
}

#[tokio::test]
async fn identical_rows_without_ids_stay_distinct() {
  let s = store().await;
  let row = json!({ "siswa_id": "s1", "status": "hadir" });
  s.set_item(&legacy_key("kehadiran"), &json!([row, row]).to_string())
    .await
    .unwrap();

  let rows = s.select("kehadiran", None).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_ne!(rows[0].id, rows[1].id);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

// Writers are not serialised: both inserts succeed, the blob stays valid
// JSON, and the later write may drop the earlier record.
#[tokio::test]
async fn concurrent_inserts_race_without_locking() {
  let s = store().await;
  let (a, b) = tokio::join!(
    s.insert("siswa", fields(json!({ "id": "s1", "nama": "A" }))),
    s.insert("siswa", fields(json!({ "id": "s2", "nama": "B" }))),
  );
  a.unwrap();
  b.unwrap();

  let blob = s.get_item(&legacy_key("siswa")).await.unwrap().unwrap();
  let rows: Vec<Value> = serde_json::from_str(&blob).unwrap();
  assert!(!rows.is_empty());
  let ids: Vec<&str> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
  assert!(ids.contains(&"s1") || ids.contains(&"s2"));
}
