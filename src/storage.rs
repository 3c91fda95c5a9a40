use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::naming::ShotName;

/// Displays the underlying io message as is; the path is kept for logging
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where shots end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A chosen base folder; labels become nested folders
    Folder(PathBuf),
    /// No folder chosen; the folder path is folded into the filename
    Download(PathBuf),
}

impl Destination {
    pub fn is_folder(&self) -> bool {
        matches!(self, Destination::Folder(_))
    }

    /// Write one shot, replacing any file with the same name
    pub async fn persist(&self, name: &ShotName, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        match self {
            Destination::Folder(base) => {
                let mut dir = base.clone();
                for part in &name.folders {
                    dir.push(part);
                }
                ensure_dir(&dir).await?;
                write_file(dir.join(&name.filename), bytes).await
            }
            Destination::Download(dir) => {
                ensure_dir(dir).await?;
                write_file(dir.join(name.flattened()), bytes).await
            }
        }
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| {
            log::error!("Failed to create folder {}: {}", dir.display(), source);
            StorageError::CreateDir { path: dir.to_path_buf(), source }
        })
}

async fn write_file(path: PathBuf, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => {
            log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
            Ok(path)
        }
        Err(source) => {
            log::error!("Failed to write {}: {}", path.display(), source);
            Err(StorageError::Write { path, source })
        }
    }
}
