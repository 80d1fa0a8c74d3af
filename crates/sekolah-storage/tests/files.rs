//! File store behaviour in both file-backed and inline fallback modes.

use sekolah_core::blob::BlobRef;
use sekolah_storage::{
  Error,
  files::{FileMode, FileStore},
};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

// ─── Fallback ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fallback_stores_inline_and_returns_it_unchanged() {
  let store = FileStore::disabled();
  assert!(!store.is_supported().await);

  let blob = store.save_file("avatars/1.png", PNG, "image/png").await.unwrap();
  assert!(blob.is_inline());
  let reference = blob.to_string();
  assert!(reference.starts_with("data:image/png;base64,"));

  assert_eq!(store.get_file(&reference).await.as_deref(), Some(reference.as_str()));
  assert_eq!(store.read_file(&reference).await.as_deref(), Some(PNG));
  store.delete_file(&reference).await.unwrap();
}

#[tokio::test]
async fn unusable_root_falls_back() {
  let dir = tempfile::tempdir().unwrap();
  let blocker = dir.path().join("blocker");
  std::fs::write(&blocker, b"not a directory").unwrap();

  let store = FileStore::new(Some(blocker.join("files")));
  assert_eq!(store.mode().await, &FileMode::Fallback);
  let blob = store.save_file("a.png", PNG, "image/png").await.unwrap();
  assert!(blob.is_inline());
}

// ─── File-backed ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_get_read_delete() {
  let dir = tempfile::tempdir().unwrap();
  let store = FileStore::new(Some(dir.path().to_path_buf()));
  assert!(store.is_supported().await);

  let blob = store.save_file("avatars/1.png", PNG, "image/png").await.unwrap();
  assert_eq!(blob, BlobRef::Path("avatars/1.png".into()));
  let reference = blob.to_string();
  assert_eq!(reference, "opfs:avatars/1.png");
  assert_eq!(std::fs::read(dir.path().join("avatars/1.png")).unwrap(), PNG);

  let url = store.get_file(&reference).await.unwrap();
  assert!(url.starts_with("file://"));
  assert!(url.ends_with("avatars/1.png"));
  assert_eq!(store.read_file(&reference).await.as_deref(), Some(PNG));

  let usage = store.total_usage().await.unwrap();
  assert_eq!((usage.files, usage.bytes), (1, PNG.len() as u64));

  store.delete_file(&reference).await.unwrap();
  assert_eq!(store.get_file(&reference).await, None);
  store.delete_file(&reference).await.unwrap();
}

#[tokio::test]
async fn write_failure_falls_back_to_inline() {
  let dir = tempfile::tempdir().unwrap();
  let store = FileStore::new(Some(dir.path().to_path_buf()));
  std::fs::write(dir.path().join("avatars"), b"file in the way").unwrap();

  let blob = store.save_file("avatars/1.png", PNG, "image/png").await.unwrap();
  assert!(blob.is_inline());
  assert_eq!(blob.decode_inline().unwrap().unwrap().1, PNG);
}

#[tokio::test]
async fn paths_escaping_the_root_are_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let store = FileStore::new(Some(dir.path().join("files")));

  for bad in ["../outside.png", "/etc/passwd", ""] {
    let err = store.save_file(bad, PNG, "image/png").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)), "{bad:?}");
  }
  assert_eq!(store.get_file("opfs:../outside.png").await, None);
}

#[tokio::test]
async fn non_references_resolve_to_nothing() {
  let store = FileStore::disabled();
  assert_eq!(store.get_file("https://example.com/a.png").await, None);
  assert_eq!(store.read_file("plain text").await, None);
}

// ─── Inline upgrade ──────────────────────────────────────────────────────────

#[tokio::test]
async fn migrate_from_base64_moves_payload_into_a_file() {
  let dir = tempfile::tempdir().unwrap();
  let store = FileStore::new(Some(dir.path().to_path_buf()));
  let inline = BlobRef::inline("image/png", PNG).to_string();

  let upgraded = store.migrate_from_base64(&inline, "logo/sekolah.png").await;
  assert_eq!(upgraded, "opfs:logo/sekolah.png");
  assert_eq!(store.read_file(&upgraded).await.as_deref(), Some(PNG));
}

#[tokio::test]
async fn migrate_from_base64_returns_input_on_failure() {
  let dir = tempfile::tempdir().unwrap();
  let store = FileStore::new(Some(dir.path().to_path_buf()));

  let broken = "data:image/png;base64,%%%";
  assert_eq!(store.migrate_from_base64(broken, "x.png").await, broken);
  assert_eq!(store.migrate_from_base64("opfs:a.png", "b.png").await, "opfs:a.png");

  let inline = BlobRef::inline("image/png", PNG).to_string();
  assert_eq!(store.migrate_from_base64(&inline, "../x.png").await, inline);
  assert_eq!(FileStore::disabled().migrate_from_base64(&inline, "x.png").await, inline);
}
