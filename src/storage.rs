// src/storage.rs

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::ports::{FileStorage, StorageError};

/// Stores files under a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a destination path below the root. Absolute paths and
    /// parent-directory components are rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }

    /// Returns the path used while a write is in flight.
    /// e.g., for "maps/a.png", it returns "maps/a.png.part"
    pub fn temporary_path(destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl FileStorage for FsStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full).await.map_err(io_err(&full))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        let temp = Self::temporary_path(&full);
        let mut file = tokio::fs::File::create(&temp).await.map_err(io_err(&temp))?;
        let written = async {
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_err(&temp)(e));
        }
        tokio::fs::rename(&temp, &full).await.map_err(io_err(&full))?;
        tracing::debug!(dest = %full.display(), bytes = bytes.len(), "stored file");
        Ok(())
    }
}
