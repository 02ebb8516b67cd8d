//! Local upload store.
//!
//! Every saved file gets a fresh name (`{unix_millis}_{8 hex}{.ext}`), so a
//! name is written once and never overwritten. Names are flat: anything with
//! a path separator or `..` is rejected before touching the filesystem.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Flat directory of uploaded media.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Upload store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a stored name to its path, rejecting anything that is not a plain file name.
    pub fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `bytes` under a new unique name with the given extension.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> StorageResult<String> {
        let mut reader = bytes;
        self.save_from(&mut reader, extension).await
    }

    /// Copy `reader` to a new unique name. A failed copy leaves no file behind.
    pub async fn save_from<R>(&self, reader: &mut R, extension: &str) -> StorageResult<String>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let extension = normalize_extension(extension)?;
        let name = unique_name(&extension);
        let path = self.root.join(&name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = match copy_into(reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(&path).await {
                    warn!(name = %name, "Failed to remove partial upload: {}", remove_err);
                }
                return Err(e.into());
            }
        };

        debug!(name = %name, bytes = written, "Saved upload");
        Ok(name)
    }

    /// Delete a stored file. Returns `false` if it did not exist.
    pub async fn delete(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name = %name, "Deleted upload");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_for(name)?;
        Ok(fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    /// Size of a stored file in bytes.
    pub async fn size(&self, name: &str) -> StorageResult<u64> {
        let path = self.path_for(name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StorageError::not_found(name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored file positioned at `offset`.
    pub async fn open_for_read(&self, name: &str, offset: u64) -> StorageResult<File> {
        let path = self.path_for(name)?;
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(name))
            }
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(file)
    }
}

async fn copy_into<R>(reader: &mut R, file: &mut File) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let written = tokio::io::copy(reader, file).await?;
    file.flush().await?;
    Ok(written)
}

fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(StorageError::invalid_name(name));
    }
    Ok(())
}

/// Lowercase, dot-prefixed, alphanumeric extension.
fn normalize_extension(extension: &str) -> StorageResult<String> {
    let bare = extension.trim().trim_start_matches('.');
    if bare.is_empty() || bare.len() > 8 || !bare.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StorageError::InvalidExtension(extension.to_string()));
    }
    Ok(format!(".{}", bare.to_ascii_lowercase()))
}

fn unique_name(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}{}", millis, &id[..8], extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn store() -> (tempfile::TempDir, LocalFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("uploads")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let (_dir, store) = store().await;
        let name = store.save(b"0123456789", "MP4").await.unwrap();
        assert!(name.ends_with(".mp4"));
        assert!(store.exists(&name).await.unwrap());
        assert_eq!(store.size(&name).await.unwrap(), 10);

        let mut file = store.open_for_read(&name, 4).await.unwrap();
        let mut rest = String::new();
        file.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "456789");
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let (_dir, store) = store().await;
        let a = store.save(b"a", ".jpg").await.unwrap();
        let b = store.save(b"b", ".jpg").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let (_dir, store) = store().await;
        let name = store.save(b"x", "png").await.unwrap();
        assert!(store.delete(&name).await.unwrap());
        assert!(!store.delete(&name).await.unwrap());
        assert!(!store.exists(&name).await.unwrap());
        assert!(store.size(&name).await.unwrap_err().is_not_found());
        assert!(store
            .open_for_read(&name, 0)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (_dir, store) = store().await;
        for name in ["../secret", "a/b.mp4", "a\\b.mp4", "", ".."] {
            assert!(matches!(
                store.delete(name).await,
                Err(StorageError::InvalidName(_))
            ));
        }
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "upload interrupted",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial bytes");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let (_dir, store) = store().await;
        let mut reader = BrokenReader { sent: false };

        let err = store.save_from(&mut reader, "mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let leftovers = std::fs::read_dir(store.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_extension() {
        let (_dir, store) = store().await;
        assert!(store.save(b"x", "").await.is_err());
        assert!(store.save(b"x", "mp4/../x").await.is_err());
    }
}
