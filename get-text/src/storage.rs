//! Staging of uploaded files on local disk.
//!
//! The [`FileSaver`] trait is the capability the request handler depends on; [`LocalFileSaver`]
//! is the production backend, writing into a single base directory that is created at startup.
//!
//! Callers are responsible for picking unique names (the handler uses a fresh UUID per request),
//! so the saver never has to lock anything.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StorageError {
    /// The configured base path exists but is a file, socket, etc.
    #[error("{path:?} is not a directory")]
    NotADirectory { path: PathBuf },

    /// Names must be a single path component
    #[error("invalid file name '{name}'")]
    InvalidName { name: String },

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for staging backends
#[async_trait]
pub trait FileSaver: Send + Sync {
    /// Write all of `content` to a file called `name` and return its absolute path
    async fn save(&self, name: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<PathBuf>;
}

/// Local filesystem saver - stores files flat in one directory
#[derive(Debug, Clone)]
pub struct LocalFileSaver {
    base_path: PathBuf,
}

impl LocalFileSaver {
    /// Create the base directory if needed and resolve it to an absolute path
    pub async fn create(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        let io_err = |source| StorageError::Io {
            path: base_path.to_path_buf(),
            source,
        };

        fs::create_dir_all(base_path).await.map_err(io_err)?;

        let metadata = fs::metadata(base_path).await.map_err(io_err)?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory {
                path: base_path.to_path_buf(),
            });
        }

        let base_path = fs::canonicalize(base_path).await.map_err(io_err)?;
        tracing::info!("Local file saver initialized (path: {:?})", base_path);

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn write(path: &Path, content: &mut (dyn AsyncRead + Send + Unpin)) -> std::io::Result<u64> {
        let mut file = fs::File::create(path).await?;
        let written = tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl FileSaver for LocalFileSaver {
    async fn save(&self, name: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<PathBuf> {
        if !is_plain_file_name(name) {
            return Err(StorageError::InvalidName { name: name.to_string() });
        }

        let full_path = self.base_path.join(name);

        match Self::write(&full_path, content).await {
            Ok(written) => {
                tracing::debug!(path = ?full_path, bytes = written, "Saved file");
                Ok(full_path)
            }
            Err(source) => {
                // Don't leave half-written uploads behind
                if let Err(e) = fs::remove_file(&full_path).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = ?full_path, error = %e, "Failed to remove partially written file");
                }
                Err(StorageError::Io { path: full_path, source })
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_makes_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("staging");

        let saver = LocalFileSaver::create(&base).await.unwrap();

        assert!(base.is_dir());
        assert!(saver.base_path().is_absolute());
    }

    #[tokio::test]
    async fn test_create_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = LocalFileSaver::create(&file).await.unwrap_err();

        // create_dir_all fails on an existing file on most platforms, otherwise metadata catches it
        assert!(matches!(err, StorageError::Io { .. } | StorageError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_save_writes_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let saver = LocalFileSaver::create(dir.path()).await.unwrap();
        let body = vec![7u8; 64 * 1024 + 3];

        let path = saver.save("abc.epub", &mut body.as_slice()).await.unwrap();

        assert!(path.is_absolute());
        assert_eq!(path.file_name().unwrap(), "abc.epub");
        assert_eq!(path.parent().unwrap(), saver.base_path());
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_save_overwrites_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let saver = LocalFileSaver::create(dir.path()).await.unwrap();

        saver.save("a.docx", &mut &b"first version"[..]).await.unwrap();
        let path = saver.save("a.docx", &mut &b"second"[..]).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_save_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let saver = LocalFileSaver::create(dir.path()).await.unwrap();

        for name in ["", ".", "..", "../escape.epub", "sub/file.epub", "sub\\file.epub"] {
            let err = saver.save(name, &mut &b"x"[..]).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidName { .. }), "name {name:?} should be rejected");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_fails_when_directory_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("staging");
        let saver = LocalFileSaver::create(&base).await.unwrap();
        std::fs::remove_dir(&base).unwrap();

        let err = saver.save("x.mobi", &mut &b"data"[..]).await.unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert!(!base.join("x.mobi").exists());
    }
}
