//! Local chunk store.
//!
//! Bytes for a file live at `<root>/<share_id>/<file_id>`. Display names
//! never reach the filesystem; only ids produced by this service do.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::constants::ARCHIVE_FILE_NAME;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn share_dir(&self, share_id: &str) -> StorageResult<PathBuf> {
        validate_key(share_id)?;
        Ok(self.root.join(share_id))
    }

    pub fn object_path(&self, share_id: &str, file_id: &str) -> StorageResult<PathBuf> {
        validate_key(file_id)?;
        Ok(self.share_dir(share_id)?.join(file_id))
    }

    pub fn archive_path(&self, share_id: &str) -> StorageResult<PathBuf> {
        Ok(self.share_dir(share_id)?.join(ARCHIVE_FILE_NAME))
    }

    /// Create the share's storage root. Idempotent.
    pub async fn ensure_share_directory(&self, share_id: &str) -> StorageResult<()> {
        fs::create_dir_all(self.share_dir(share_id)?).await?;
        Ok(())
    }

    /// Write `bytes` at `offset` in the file's backing object.
    ///
    /// The object is truncated to `offset + bytes.len()`, so a chunk that is
    /// resubmitted after a failed attempt replaces whatever that attempt left
    /// behind. An empty chunk still materializes the object.
    pub async fn append_chunk(
        &self,
        share_id: &str,
        file_id: &str,
        offset: u64,
        bytes: &[u8],
    ) -> StorageResult<()> {
        self.ensure_share_directory(share_id).await?;
        let path = self.object_path(share_id, file_id)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;

        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(bytes).await?;
        file.set_len(offset + bytes.len() as u64).await?;
        file.flush().await?;

        tracing::debug!(
            share_id = %share_id,
            file_id = %file_id,
            offset = offset,
            len = bytes.len(),
            "Chunk written"
        );

        Ok(())
    }

    pub async fn open_for_read(&self, share_id: &str, file_id: &str) -> StorageResult<File> {
        let path = self.object_path(share_id, file_id)?;
        open_existing(&path).await
    }

    pub async fn open_archive(&self, share_id: &str) -> StorageResult<File> {
        let path = self.archive_path(share_id)?;
        open_existing(&path).await
    }

    pub async fn delete_object(&self, share_id: &str, file_id: &str) -> StorageResult<()> {
        let path = self.object_path(share_id, file_id)?;
        ignore_missing(fs::remove_file(&path).await)
    }

    /// Remove the whole share directory. A directory that is already gone is
    /// not an error.
    pub async fn delete_all(&self, share_id: &str) -> StorageResult<()> {
        let dir = self.share_dir(share_id)?;
        ignore_missing(fs::remove_dir_all(&dir).await)?;
        tracing::info!(share_id = %share_id, "Share storage removed");
        Ok(())
    }
}

async fn open_existing(path: &Path) -> StorageResult<File> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn ignore_missing(result: std::io::Result<()>) -> StorageResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
