//! Chunked upload assembly.
//!
//! Each logical upload is a small state machine persisted in
//! `upload_sessions`: the next expected chunk index and the bytes accepted
//! so far. Chunks are only ever appended at the session's offset, so a
//! stored file is always a prefix of what the client sent in order.

use uuid::Uuid;

use crate::access::require_share;
use crate::config::ShareConfig;
use crate::database::{execute_query, fetch_one, get_connection, queries, DbConn, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::FileRecord;
use crate::storage::ChunkStore;

/// One chunk as submitted by a client.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub share_id: &'a str,
    /// Absent for the first chunk of a new file.
    pub file_id: Option<&'a str>,
    pub file_name: &'a str,
    pub index: i64,
    pub total: i64,
    pub bytes: &'a [u8],
}

impl Chunk<'_> {
    fn is_last(&self) -> bool {
        self.index == self.total - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCommit {
    pub file_id: String,
    pub file_name: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSession {
    pub expected_index: i64,
    pub accumulated_size: i64,
}

/// Where the next chunk will land, decided before any byte is written.
enum Target {
    NewFile { file_id: String },
    Existing { file_id: String, offset: i64 },
}

pub fn find_session(conn: &DbConn, share_id: &str, file_id: &str) -> AppResult<Option<UploadSession>> {
    fetch_one(
        conn,
        queries::uploads::SELECT_BY_FILE,
        &[&file_id, &share_id],
        |row| {
            Ok(UploadSession {
                expected_index: row.get(2)?,
                accumulated_size: row.get(3)?,
            })
        },
    )
}

/// Validate, store and account for one chunk.
///
/// A chunk whose index is not the one the session expects is rejected with
/// that expected index and changes nothing, neither bytes nor session.
///
/// Callers upload one file's chunks sequentially. Two concurrent submissions
/// of the same index both write at the same offset before one of them loses
/// the session update, so the loser's bytes may land on disk.
pub async fn submit_chunk(
    pool: &DbPool,
    store: &ChunkStore,
    limits: &ShareConfig,
    chunk: Chunk<'_>,
) -> AppResult<ChunkCommit> {
    if chunk.total < 1 {
        return Err(AppError::BadRequest("totalChunks must be at least 1".to_string()));
    }
    if chunk.index < 0 || chunk.index >= chunk.total {
        return Err(AppError::BadRequest(format!(
            "chunkIndex must be between 0 and {}",
            chunk.total - 1
        )));
    }

    let target = {
        let conn = get_connection(pool)?;
        resolve_target(&conn, &chunk)?
    };

    let offset = match &target {
        Target::NewFile { .. } => 0,
        Target::Existing { offset, .. } => *offset,
    };
    let new_size = offset + chunk.bytes.len() as i64;

    if limits.max_size > 0 && new_size as u64 > limits.max_size {
        return Err(AppError::FileTooLarge { max: limits.max_size });
    }

    let file_id = match &target {
        Target::NewFile { file_id } | Target::Existing { file_id, .. } => file_id.clone(),
    };

    store
        .append_chunk(chunk.share_id, &file_id, offset as u64, chunk.bytes)
        .await?;

    let conn = get_connection(pool)?;
    match target {
        Target::NewFile { .. } => {
            execute_query(
                &conn,
                queries::files::INSERT,
                &[&file_id, &chunk.share_id, &chunk.file_name],
            )?;
            if !chunk.is_last() {
                execute_query(
                    &conn,
                    queries::uploads::INSERT,
                    &[&file_id, &chunk.share_id, &1_i64, &new_size],
                )?;
            }
        }
        Target::Existing { .. } => {
            let advanced = execute_query(
                &conn,
                queries::uploads::ADVANCE,
                &[&new_size, &file_id, &chunk.index],
            )?;
            if advanced == 0 {
                // Another submission of this index won the race.
                let expected = find_session(&conn, chunk.share_id, &file_id)?
                    .map(|s| s.expected_index)
                    .unwrap_or(chunk.index + 1);
                return Err(AppError::UnexpectedChunkIndex { expected });
            }
        }
    }

    tracing::debug!(
        share_id = %chunk.share_id,
        file_id = %file_id,
        index = chunk.index,
        total = chunk.total,
        "Chunk committed"
    );

    if chunk.is_last() {
        execute_query(&conn, queries::files::MARK_COMPLETE, &[&new_size, &file_id])?;
        execute_query(&conn, queries::uploads::DELETE, &[&file_id])?;
        tracing::info!(
            share_id = %chunk.share_id,
            file_id = %file_id,
            size = new_size,
            chunks = chunk.total,
            "File upload completed"
        );
    }

    let file_name = match chunk.file_id {
        Some(_) => fetch_one(
            &conn,
            queries::files::SELECT_BY_ID,
            &[&file_id, &chunk.share_id],
            FileRecord::from_row,
        )?
        .map(|file| file.name)
        .unwrap_or_else(|| chunk.file_name.to_string()),
        None => chunk.file_name.to_string(),
    };

    Ok(ChunkCommit {
        file_id,
        file_name,
        is_complete: chunk.is_last(),
    })
}

fn resolve_target(conn: &DbConn, chunk: &Chunk<'_>) -> AppResult<Target> {
    let share = require_share(conn, chunk.share_id)?;
    if share.upload_locked {
        return Err(AppError::ShareLocked);
    }

    let Some(file_id) = chunk.file_id else {
        if chunk.index != 0 {
            return Err(AppError::UnexpectedChunkIndex { expected: 0 });
        }
        if chunk.file_name.trim().is_empty() {
            return Err(AppError::BadRequest("File name is required".to_string()));
        }
        return Ok(Target::NewFile {
            file_id: Uuid::new_v4().to_string(),
        });
    };

    let file = fetch_one(
        conn,
        queries::files::SELECT_BY_ID,
        &[&file_id, &chunk.share_id],
        FileRecord::from_row,
    )?
    .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if file.is_complete {
        return Err(AppError::FileComplete);
    }

    let session = find_session(conn, chunk.share_id, file_id)?
        .ok_or_else(|| AppError::NotFound("Upload session not found".to_string()))?;

    if chunk.index != session.expected_index {
        return Err(AppError::UnexpectedChunkIndex {
            expected: session.expected_index,
        });
    }

    Ok(Target::Existing {
        file_id: file_id.to_string(),
        offset: session.accumulated_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_state, TestShare};
    use tokio::io::AsyncReadExt;

    fn chunk<'a>(file_id: Option<&'a str>, index: i64, total: i64, bytes: &'a [u8]) -> Chunk<'a> {
        Chunk {
            share_id: "s1",
            file_id,
            file_name: "notes.txt",
            index,
            total,
            bytes,
        }
    }

    async fn stored(store: &ChunkStore, file_id: &str) -> Vec<u8> {
        let mut file = store.open_for_read("s1", file_id).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    fn file_row(pool: &DbPool, file_id: &str) -> FileRecord {
        let conn = pool.get().unwrap();
        fetch_one(&conn, queries::files::SELECT_BY_ID, &[&file_id, &"s1"], FileRecord::from_row)
            .unwrap()
            .unwrap()
    }

    fn session(pool: &DbPool, file_id: &str) -> Option<UploadSession> {
        let conn = pool.get().unwrap();
        find_session(&conn, "s1", file_id).unwrap()
    }

    #[tokio::test]
    async fn test_in_order_chunks_assemble_file() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = &state.config.share;

        let first = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 3, b"abc"))
            .await
            .unwrap();
        assert!(!first.is_complete);
        assert_eq!(first.file_name, "notes.txt");
        let id = first.file_id.as_str();
        assert!(!file_row(&state.pool, id).is_complete);

        submit_chunk(&state.pool, &state.store, limits, chunk(Some(id), 1, 3, b"defg"))
            .await
            .unwrap();
        assert!(!file_row(&state.pool, id).is_complete);

        let last = submit_chunk(&state.pool, &state.store, limits, chunk(Some(id), 2, 3, b"hi"))
            .await
            .unwrap();
        assert!(last.is_complete);

        let file = file_row(&state.pool, id);
        assert!(file.is_complete);
        assert_eq!(file.size, 9);
        assert_eq!(stored(&state.store, id).await, b"abcdefghi");
        assert!(session(&state.pool, id).is_none());
    }

    #[tokio::test]
    async fn test_out_of_order_chunk_rejected_without_mutation() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = &state.config.share;

        let first = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 4, b"abc"))
            .await
            .unwrap();
        let id = first.file_id.as_str();

        for bad_index in [0, 2, 3] {
            let result =
                submit_chunk(&state.pool, &state.store, limits, chunk(Some(id), bad_index, 4, b"zz"))
                    .await;
            assert!(matches!(result, Err(AppError::UnexpectedChunkIndex { expected: 1 })));
        }

        assert_eq!(stored(&state.store, id).await, b"abc");
        assert_eq!(
            session(&state.pool, id),
            Some(UploadSession {
                expected_index: 1,
                accumulated_size: 3
            })
        );
    }

    #[tokio::test]
    async fn test_new_upload_must_start_at_zero() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);

        let result = submit_chunk(
            &state.pool,
            &state.store,
            &state.config.share,
            chunk(None, 1, 3, b"abc"),
        )
        .await;

        assert!(matches!(result, Err(AppError::UnexpectedChunkIndex { expected: 0 })));
    }

    #[tokio::test]
    async fn test_locked_share_rejects_chunks() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = &state.config.share;

        let first = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 2, b"abc"))
            .await
            .unwrap();
        {
            let conn = state.pool.get().unwrap();
            execute_query(&conn, queries::shares::LOCK_UPLOADS, &[&"s1"]).unwrap();
        }

        let result = submit_chunk(
            &state.pool,
            &state.store,
            limits,
            chunk(Some(&first.file_id), 1, 2, b"def"),
        )
        .await;
        assert!(matches!(result, Err(AppError::ShareLocked)));

        let result = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 1, b"x")).await;
        assert!(matches!(result, Err(AppError::ShareLocked)));

        assert_eq!(stored(&state.store, &first.file_id).await, b"abc");
    }

    #[tokio::test]
    async fn test_chunk_after_completion_rejected() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = &state.config.share;

        let done = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 1, b"abc"))
            .await
            .unwrap();
        assert!(done.is_complete);

        let result = submit_chunk(
            &state.pool,
            &state.store,
            limits,
            chunk(Some(&done.file_id), 1, 2, b"more"),
        )
        .await;
        assert!(matches!(result, Err(AppError::FileComplete)));
    }

    #[tokio::test]
    async fn test_empty_single_chunk_file() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);

        let done = submit_chunk(
            &state.pool,
            &state.store,
            &state.config.share,
            chunk(None, 0, 1, b""),
        )
        .await
        .unwrap();

        let file = file_row(&state.pool, &done.file_id);
        assert!(file.is_complete);
        assert_eq!(file.size, 0);
        assert!(stored(&state.store, &done.file_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_size_limit_enforced() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = ShareConfig {
            max_size: 4,
            ..ShareConfig::default()
        };

        let first = submit_chunk(&state.pool, &state.store, &limits, chunk(None, 0, 2, b"abc"))
            .await
            .unwrap();
        let result = submit_chunk(
            &state.pool,
            &state.store,
            &limits,
            chunk(Some(&first.file_id), 1, 2, b"de"),
        )
        .await;

        assert!(matches!(result, Err(AppError::FileTooLarge { max: 4 })));
        assert_eq!(stored(&state.store, &first.file_id).await, b"abc");
    }

    #[tokio::test]
    async fn test_invalid_chunk_bounds_and_unknown_targets() {
        let (state, _dir) = create_test_state();
        TestShare::new("s1").insert(&state.pool);
        let limits = &state.config.share;

        let result = submit_chunk(&state.pool, &state.store, limits, chunk(None, 0, 0, b"")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result = submit_chunk(&state.pool, &state.store, limits, chunk(None, 3, 3, b"")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result =
            submit_chunk(&state.pool, &state.store, limits, chunk(Some("nope"), 1, 3, b"")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let mut orphan = chunk(None, 0, 1, b"");
        orphan.share_id = "missing";
        let result = submit_chunk(&state.pool, &state.store, limits, orphan).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
