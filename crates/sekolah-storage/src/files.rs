//! Binary asset storage (avatars, logos) with an inline fallback.
//!
//! When a file root is configured and usable, assets are written under it and
//! referenced as `opfs:<path>`. Otherwise they are encoded as data URLs and
//! stored inline in the record that references them. Callers treat both
//! forms as opaque strings and resolve them through [`FileStore::get_file`].

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tokio::sync::OnceCell;

use sekolah_core::blob::BlobRef;

use crate::{Error, Result};

/// Resolved capability of a [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMode {
  /// Files are written under this root.
  Ready(PathBuf),
  /// No usable file root; everything is stored inline.
  Fallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileUsage {
  pub files: u64,
  pub bytes: u64,
}

pub struct FileStore {
  root: Option<PathBuf>,
  mode: OnceCell<FileMode>,
}

impl FileStore {
  /// A store rooted at `root`, or permanently in fallback mode for `None`.
  /// The root is checked on first use.
  pub fn new(root: Option<PathBuf>) -> Self { Self { root, mode: OnceCell::new() } }

  pub fn disabled() -> Self { Self::new(None) }

  /// Resolve the capability once: `Ready` if the root exists or can be
  /// created, `Fallback` otherwise.
  pub async fn mode(&self) -> &FileMode {
    self
      .mode
      .get_or_init(|| async {
        let Some(root) = &self.root else {
          tracing::warn!("file storage unavailable, storing assets inline");
          return FileMode::Fallback;
        };
        match tokio::fs::create_dir_all(root).await {
          Ok(()) => FileMode::Ready(root.clone()),
          Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "file storage unusable, storing assets inline");
            FileMode::Fallback
          }
        }
      })
      .await
  }

  pub async fn is_supported(&self) -> bool { matches!(self.mode().await, FileMode::Ready(_)) }

  async fn ready_root(&self) -> Option<&Path> {
    match self.mode().await {
      FileMode::Ready(root) => Some(root.as_path()),
      FileMode::Fallback => None,
    }
  }

  async fn write(&self, root: &Path, path: &str, bytes: &[u8]) -> Result<()> {
    let full = root.join(validate_path(path)?);
    if let Some(parent) = full.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full, bytes).await?;
    tracing::debug!(path, bytes = bytes.len(), "file saved");
    Ok(())
  }

  /// Store `bytes` and return the reference to persist.
  ///
  /// Falls back to an inline reference when file storage is unavailable or
  /// the write fails. Only an invalid `path` is an error.
  pub async fn save_file(&self, path: &str, bytes: &[u8], media_type: &str) -> Result<BlobRef> {
    validate_path(path)?;
    let Some(root) = self.ready_root().await else {
      return Ok(BlobRef::inline(media_type, bytes));
    };
    match self.write(root, path, bytes).await {
      Ok(()) => Ok(BlobRef::path(path)),
      Err(e) => {
        tracing::warn!(path, error = %e, "file write failed, storing inline");
        Ok(BlobRef::inline(media_type, bytes))
      }
    }
  }

  fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
    validate_path(path).ok().map(|p| root.join(p))
  }

  /// A displayable URL for `reference`: inline references are returned as
  /// they are, path references become a `file://` URL. `None` when the
  /// reference is not a blob reference or its file is gone.
  pub async fn get_file(&self, reference: &str) -> Option<String> {
    match BlobRef::parse(reference).ok()? {
      BlobRef::Inline(url) => Some(url),
      BlobRef::Path(path) => {
        let full = Self::resolve(self.ready_root().await?, &path)?;
        let meta = tokio::fs::metadata(&full).await.ok()?;
        if !meta.is_file() {
          return None;
        }
        let full = std::path::absolute(&full).unwrap_or(full);
        Some(format!("file://{}", full.display()))
      }
    }
  }

  /// Raw bytes behind `reference`, whichever form it takes.
  pub async fn read_file(&self, reference: &str) -> Option<Vec<u8>> {
    let blob = BlobRef::parse(reference).ok()?;
    match &blob {
      BlobRef::Inline(_) => blob.decode_inline().ok().flatten().map(|(_, bytes)| bytes),
      BlobRef::Path(path) => {
        let full = Self::resolve(self.ready_root().await?, path)?;
        tokio::fs::read(full).await.ok()
      }
    }
  }

  /// Remove the file behind `reference`. Inline references and files that
  /// are already gone succeed without doing anything.
  pub async fn delete_file(&self, reference: &str) -> Result<()> {
    let BlobRef::Path(path) = BlobRef::parse(reference)? else {
      return Ok(());
    };
    let Some(root) = self.ready_root().await else {
      return Ok(());
    };
    let full = root.join(validate_path(&path)?);
    match tokio::fs::remove_file(&full).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  /// Move an inline payload into a file at `target_path`.
  ///
  /// Returns the new path reference, or `inline` unchanged if anything goes
  /// wrong, including file storage being unavailable.
  pub async fn migrate_from_base64(&self, inline: &str, target_path: &str) -> String {
    let decoded = BlobRef::parse(inline).and_then(|blob| blob.decode_inline());
    let bytes = match decoded {
      Ok(Some((_, bytes))) => bytes,
      Ok(None) => return inline.to_owned(),
      Err(e) => {
        tracing::warn!(error = %e, "not an inline payload, leaving as is");
        return inline.to_owned();
      }
    };
    let Some(root) = self.ready_root().await else {
      return inline.to_owned();
    };
    match self.write(root, target_path, &bytes).await {
      Ok(()) => BlobRef::path(target_path).to_string(),
      Err(e) => {
        tracing::warn!(target_path, error = %e, "inline upgrade failed, keeping inline data");
        inline.to_owned()
      }
    }
  }

  /// File count and total size under the root. Zero in fallback mode.
  pub async fn total_usage(&self) -> Result<FileUsage> {
    match self.ready_root().await {
      Some(root) => Ok(dir_usage(root).await?),
      None => Ok(FileUsage::default()),
    }
  }
}

/// Reject empty, absolute and parent-escaping paths.
fn validate_path(path: &str) -> Result<PathBuf> {
  let candidate = Path::new(path);
  let valid = !path.is_empty()
    && candidate
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
  if !valid {
    return Err(Error::InvalidPath(path.to_owned()));
  }
  Ok(candidate.to_path_buf())
}

/// Recursively sum regular files below `root`. A missing root is empty.
pub async fn dir_usage(root: &Path) -> std::io::Result<FileUsage> {
  let mut usage = FileUsage::default();
  let mut pending = vec![root.to_path_buf()];

  while let Some(dir) = pending.pop() {
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
      Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
      let meta = entry.metadata().await?;
      if meta.is_dir() {
        pending.push(entry.path());
      } else if meta.is_file() {
        usage.files += 1;
        usage.bytes += meta.len();
      }
    }
  }

  Ok(usage)
}
