//! Share archive builder.
//!
//! Packs every file of a share into `<share>/archive.zip`. The build runs
//! on the blocking pool and reports its outcome over a oneshot channel, so
//! the request that triggers it never waits on compression.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::oneshot;
use zip::write::SimpleFileOptions;
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter};

use crate::database::{execute_query, fetch_all, get_connection, queries, DbPool};
use crate::error::AppResult;
use crate::models::FileRecord;
use crate::storage::{ChunkStore, StorageError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive task failed: {0}")]
    Task(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// One file to pack: its display name and where its bytes live.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
}

impl ArchiveEntry {
    pub fn for_file(store: &ChunkStore, file: &FileRecord) -> ArchiveResult<Self> {
        Ok(Self {
            name: file.name.clone(),
            path: store.object_path(&file.share_id, &file.id)?,
        })
    }
}

/// Start building the archive for `share_id` in the background.
///
/// `entries` are written in the order given. The receiver yields the
/// outcome once the archive is in place, or the error that aborted it.
pub fn build(
    store: &ChunkStore,
    share_id: &str,
    entries: Vec<ArchiveEntry>,
    compression_level: u8,
) -> oneshot::Receiver<ArchiveResult<()>> {
    let (tx, rx) = oneshot::channel();
    let dest = store.archive_path(share_id);

    tokio::spawn(async move {
        let result = match dest {
            Ok(dest) => tokio::task::spawn_blocking(move || {
                write_archive(&entries, &dest, compression_level)
            })
            .await
            .unwrap_or_else(|e| Err(ArchiveError::Task(e.to_string()))),
            Err(e) => Err(e.into()),
        };

        // Receiver may already be gone.
        let _ = tx.send(result);
    });

    rx
}

/// Write `entries` into a zip at `dest`, replacing any previous archive.
///
/// The archive is assembled in a per-build temp file next to `dest` and
/// renamed into place, so a failed build never leaves a truncated
/// `archive.zip` behind and overlapping builds never share a temp file.
pub fn write_archive(entries: &[ArchiveEntry], dest: &Path, compression_level: u8) -> ArchiveResult<()> {
    let tmp = dest.with_extension(format!("zip.{}.partial", Uuid::new_v4().simple()));

    let result = write_zip(entries, &tmp, compression_level);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        return result;
    }

    fs::rename(&tmp, dest)?;
    Ok(())
}

fn write_zip(entries: &[ArchiveEntry], path: &Path, compression_level: u8) -> ArchiveResult<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let base = if compression_level == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(compression_level.min(9))))
    };

    let mut used = HashSet::new();
    for entry in entries {
        let mut source = BufReader::new(File::open(&entry.path)?);
        let size = source.get_ref().metadata()?.len();
        let options = base.large_file(size >= u64::from(u32::MAX));

        zip.start_file(unique_entry_name(&entry.name, &mut used), options)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer)?;
    Ok(())
}

/// Display names need not be unique within a share, zip entries must be.
/// Later duplicates become `name (1).ext`, `name (2).ext`, ...
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Build the archive for a finalized share in the background.
///
/// Failures are logged and leave `is_zip_ready` unset; the next finalize
/// starts over from scratch.
pub fn spawn_share_archive(pool: DbPool, store: ChunkStore, share_id: String, compression_level: u8) {
    tokio::spawn(async move {
        build_share_archive(&pool, &store, &share_id, compression_level).await;
    });
}

/// Build the share's archive and flag it ready. A share that was reopened
/// while the build ran stays not ready; its next finalize rebuilds.
pub async fn build_share_archive(pool: &DbPool, store: &ChunkStore, share_id: &str, compression_level: u8) {
    let entries = match load_entries(pool, store, share_id) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(share_id = %share_id, error = %e, "Failed to list files for archive");
            return;
        }
    };
    let count = entries.len();

    match build(store, share_id, entries, compression_level).await {
        Ok(Ok(())) => {
            let marked = get_connection(pool).and_then(|conn| {
                execute_query(&conn, queries::shares::SET_ZIP_READY, &[&share_id])
            });
            match marked {
                Ok(0) => tracing::info!(share_id = %share_id, "Share reopened during archive build"),
                Ok(_) => tracing::info!(share_id = %share_id, files = count, "Archive ready"),
                Err(e) => {
                    tracing::error!(share_id = %share_id, error = %e, "Failed to flag archive ready")
                }
            }
        }
        Ok(Err(e)) => {
            tracing::error!(share_id = %share_id, error = %e, "Archive build failed");
        }
        Err(_) => {
            tracing::error!(share_id = %share_id, "Archive build dropped without a result");
        }
    }
}

fn load_entries(pool: &DbPool, store: &ChunkStore, share_id: &str) -> AppResult<Vec<ArchiveEntry>> {
    let conn = get_connection(pool)?;
    let files = fetch_all(
        &conn,
        queries::files::SELECT_ALL_FOR_SHARE,
        &[&share_id],
        FileRecord::from_row,
    )?;

    let entries = files
        .iter()
        .filter(|file| file.is_complete)
        .map(|file| ArchiveEntry::for_file(store, file))
        .collect::<ArchiveResult<Vec<_>>>()?;

    Ok(entries)
}
