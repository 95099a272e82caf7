use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};

use crate::access::{authorize, find_share, require_finalized_share, require_share};
use crate::auth::{AppState, ShareAccessToken, ShareOwner};
use crate::constants::PUBLIC_TOKEN_LEN;
use crate::database::{execute_query, fetch_all, fetch_one, get_connection, queries, DbConn};
use crate::delivery::{
    archive_headers, mime_type_for, preview_type, share_file_headers, stream_file, Intent,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChunkUploadQuery, ChunkUploadResponse, FileDownloadQuery, FileMetadataResponse, FileRecord,
    FileResponse, PublicLinkRequest, PublicLinkResponse,
};
use crate::upload::{submit_chunk, Chunk};
use crate::utils::datetime::{checked_offset, format_datetime};
use crate::utils::random_token;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shares/:id/files", get(list_files).post(upload_chunk))
        .route("/shares/:id/files/zip", get(get_zip))
        .route(
            "/shares/:id/files/:file_id",
            get(get_file).delete(remove_file),
        )
        // Static segments win over `:filename`, so a file fetched with the
        // cosmetic name `metadata` or `public-link` needs the bare route.
        .route("/shares/:id/files/:file_id/metadata", get(get_file_metadata))
        .route("/shares/:id/files/:file_id/public-link", post(create_public_link))
        .route("/shares/:id/files/:file_id/:filename", get(get_file_with_name))
}

fn find_file(conn: &DbConn, share_id: &str, file_id: &str) -> AppResult<Option<FileRecord>> {
    fetch_one(
        conn,
        queries::files::SELECT_BY_ID,
        &[&file_id, &share_id],
        FileRecord::from_row,
    )
}

/// Files still receiving chunks do not exist for visitors.
fn require_complete_file(conn: &DbConn, share_id: &str, file_id: &str) -> AppResult<FileRecord> {
    find_file(conn, share_id, file_id)?
        .filter(|file| file.is_complete)
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

async fn upload_chunk(
    State(state): State<AppState>,
    owner: ShareOwner,
    Query(query): Query<ChunkUploadQuery>,
    body: Bytes,
) -> AppResult<Json<ChunkUploadResponse>> {
    let commit = submit_chunk(
        &state.pool,
        &state.store,
        &state.config.share,
        Chunk {
            share_id: &owner.share_id,
            file_id: query.file_id.as_deref(),
            file_name: &query.name,
            index: query.chunk_index,
            total: query.total_chunks,
            bytes: &body,
        },
    )
    .await?;

    Ok(Json(ChunkUploadResponse {
        file_id: commit.file_id,
        file_name: commit.file_name,
        is_complete: commit.is_complete,
    }))
}

async fn list_files(
    State(state): State<AppState>,
    owner: ShareOwner,
) -> AppResult<Json<Vec<FileResponse>>> {
    let conn = get_connection(&state.pool)?;
    find_share(&conn, &owner.share_id)?
        .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

    let files = fetch_all(
        &conn,
        queries::files::SELECT_ALL_FOR_SHARE,
        &[&owner.share_id],
        FileRecord::from_row,
    )?;

    Ok(Json(
        files.iter().map(|file| FileResponse::new(file, true)).collect(),
    ))
}

async fn get_zip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ShareAccessToken(token): ShareAccessToken,
    headers: HeaderMap,
) -> AppResult<Response> {
    {
        let conn = get_connection(&state.pool)?;
        let share = require_finalized_share(&conn, &id)?;
        authorize(&share, token.as_deref(), &state.config)?;

        if !share.is_zip_ready {
            return Err(AppError::NotFound("Archive is not ready".to_string()));
        }
    }

    let archive = state.store.open_archive(&id).await?;
    stream_file(archive, &headers, &archive_headers(&id)).await
}

/// Name, size and rendering hints. Only checks that the share is visible,
/// so clients can decide how to render before a password is supplied.
async fn get_file_metadata(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(String, String)>,
) -> AppResult<Json<FileMetadataResponse>> {
    let conn = get_connection(&state.pool)?;
    require_share(&conn, &id)?;
    let file = require_complete_file(&conn, &id, &file_id)?;

    let mime_type = mime_type_for(&file.name);
    let kind = preview_type(&mime_type, &file.name);

    Ok(Json(FileMetadataResponse {
        id: file.id,
        name: file.name,
        size: file.size,
        mime_type,
        supports_preview: kind.supports_preview(),
        preview_type: kind.as_str().to_string(),
    }))
}

async fn get_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(String, String)>,
    Query(query): Query<FileDownloadQuery>,
    ShareAccessToken(token): ShareAccessToken,
    headers: HeaderMap,
) -> AppResult<Response> {
    serve_share_file(&state, &id, &file_id, &query, token.as_deref(), &headers).await
}

/// The trailing file name is cosmetic and never checked.
async fn get_file_with_name(
    State(state): State<AppState>,
    Path((id, file_id, _filename)): Path<(String, String, String)>,
    Query(query): Query<FileDownloadQuery>,
    ShareAccessToken(token): ShareAccessToken,
    headers: HeaderMap,
) -> AppResult<Response> {
    serve_share_file(&state, &id, &file_id, &query, token.as_deref(), &headers).await
}

async fn serve_share_file(
    state: &AppState,
    share_id: &str,
    file_id: &str,
    query: &FileDownloadQuery,
    token: Option<&str>,
    headers: &HeaderMap,
) -> AppResult<Response> {
    let file = {
        let conn = get_connection(&state.pool)?;
        let share = require_share(&conn, share_id)?;
        authorize(&share, token, &state.config)?;
        require_complete_file(&conn, share_id, file_id)?
    };

    let intent = Intent::from_flags(query.download.as_deref(), query.preview.as_deref());
    let handle = state.store.open_for_read(share_id, &file.id).await?;

    stream_file(handle, headers, &share_file_headers(&file.name, intent)).await
}

async fn remove_file(
    State(state): State<AppState>,
    owner: ShareOwner,
    Path((_, file_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    {
        let conn = get_connection(&state.pool)?;
        find_file(&conn, &owner.share_id, &file_id)?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        execute_query(&conn, queries::files::DELETE, &[&file_id, &owner.share_id])?;
    }

    state.store.delete_object(&owner.share_id, &file_id).await?;

    tracing::info!(share_id = %owner.share_id, file_id = %file_id, "File removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn create_public_link(
    State(state): State<AppState>,
    owner: ShareOwner,
    Path((_, file_id)): Path<(String, String)>,
    request: Option<Json<PublicLinkRequest>>,
) -> AppResult<Json<PublicLinkResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let days = request
        .expires_in_days
        .unwrap_or(state.config.share.public_link_expire_days);
    if days < 0 {
        return Err(AppError::Validation("expiresInDays must not be negative".to_string()));
    }

    let conn = get_connection(&state.pool)?;
    require_complete_file(&conn, &owner.share_id, &file_id)?;

    let token = random_token(PUBLIC_TOKEN_LEN);
    let expires_at = if days > 0 {
        let at = checked_offset(Utc::now(), Duration::try_days(days))
            .ok_or_else(|| AppError::Validation("expiresInDays is out of range".to_string()))?;
        Some(format_datetime(&at))
    } else {
        None
    };

    execute_query(
        &conn,
        queries::files::UPDATE_PUBLIC_TOKEN,
        &[&token, &expires_at, &file_id, &owner.share_id],
    )?;

    tracing::info!(share_id = %owner.share_id, file_id = %file_id, "Public link issued");

    Ok(Json(PublicLinkResponse {
        url: format!("/api/v1/f/{}", token),
        token,
        expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use crate::archive::{write_archive, ArchiveEntry};
    use crate::test_utils::{
        create_test_file, create_test_server, owner_header_value, upload_via_api, TestShare,
    };
    use axum::http::{header, HeaderValue, StatusCode};
    use serde_json::Value;

    #[tokio::test]
    async fn test_chunked_upload_over_http() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("up").insert(&state.pool);
        let owner = owner_header_value(&state, "up");

        let first = server
            .post("/api/v1/shares/up/files")
            .add_header(header::AUTHORIZATION, owner.clone())
            .add_query_param("name", "big.bin")
            .add_query_param("chunkIndex", 0)
            .add_query_param("totalChunks", 2)
            .bytes(b"hello "[..].into())
            .await
            .json::<Value>();
        assert_eq!(first["fileName"], "big.bin");
        let file_id = first["fileId"].as_str().unwrap().to_string();

        let skipped = server
            .post("/api/v1/shares/up/files")
            .add_header(header::AUTHORIZATION, owner.clone())
            .add_query_param("fileId", &file_id)
            .add_query_param("name", "big.bin")
            .add_query_param("chunkIndex", 5)
            .add_query_param("totalChunks", 6)
            .bytes(b"nope"[..].into())
            .expect_failure()
            .await;
        assert_eq!(skipped.status_code(), StatusCode::BAD_REQUEST);
        let body = skipped.json::<Value>();
        assert_eq!(body["error"], "unexpected_chunk_index");
        assert_eq!(body["expectedChunkIndex"], 1);

        let last = server
            .post("/api/v1/shares/up/files")
            .add_header(header::AUTHORIZATION, owner.clone())
            .add_query_param("fileId", &file_id)
            .add_query_param("name", "big.bin")
            .add_query_param("chunkIndex", 1)
            .add_query_param("totalChunks", 2)
            .bytes(b"world"[..].into())
            .await
            .json::<Value>();
        assert_eq!(last["isComplete"], true);

        let listed = server
            .get("/api/v1/shares/up/files")
            .add_header(header::AUTHORIZATION, owner)
            .await
            .json::<Value>();
        assert_eq!(listed[0]["size"], 11);
        assert_eq!(listed[0]["isComplete"], true);

        let fetched = server.get(&format!("/api/v1/shares/up/files/{}", file_id)).await;
        assert_eq!(fetched.as_bytes().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_upload_to_locked_share_rejected() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("done").locked().insert(&state.pool);

        let response = server
            .post("/api/v1/shares/done/files")
            .add_header(header::AUTHORIZATION, owner_header_value(&state, "done"))
            .add_query_param("name", "late.txt")
            .add_query_param("chunkIndex", 0)
            .add_query_param("totalChunks", 1)
            .bytes(b"late"[..].into())
            .expect_failure()
            .await;

        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["error"], "share_locked");
    }

    #[tokio::test]
    async fn test_delivery_headers_follow_intent() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("media").locked().insert(&state.pool);
        let video = create_test_file(&state, "media", "clip.mp4", b"0123456789").await;

        let download = server.get(&format!("/api/v1/shares/media/files/{}", video)).await;
        let headers = download.headers();
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "sandbox");
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment"));

        let preview = server
            .get(&format!("/api/v1/shares/media/files/{}/clip.mp4", video))
            .add_query_param("download", "false")
            .add_query_param("preview", "true")
            .await;
        let headers = preview.headers();
        assert_eq!(
            headers[header::CONTENT_SECURITY_POLICY],
            "media-src 'self'; object-src 'none'"
        );
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("inline"));

        let misnamed = server
            .get(&format!("/api/v1/shares/media/files/{}/whatever.txt", video))
            .await;
        assert_eq!(misnamed.as_bytes().as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_range_requests() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("ranged").locked().insert(&state.pool);
        let file = create_test_file(&state, "ranged", "data.bin", b"0123456789").await;
        let path = format!("/api/v1/shares/ranged/files/{}", file);

        let partial = server
            .get(&path)
            .add_header(header::RANGE, HeaderValue::from_static("bytes=2-5"))
            .await;
        assert_eq!(partial.status_code(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(partial.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(partial.as_bytes().as_ref(), b"2345");

        let tail = server
            .get(&path)
            .add_header(header::RANGE, HeaderValue::from_static("bytes=-3"))
            .await;
        assert_eq!(tail.as_bytes().as_ref(), b"789");

        let beyond = server
            .get(&path)
            .add_header(header::RANGE, HeaderValue::from_static("bytes=20-"))
            .expect_failure()
            .await;
        assert_eq!(beyond.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(beyond.headers()[header::CONTENT_RANGE], "bytes */10");
    }

    #[tokio::test]
    async fn test_metadata_skips_capability_check() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("locked-pdf").password("pw").locked().insert(&state.pool);
        let pdf = create_test_file(&state, "locked-pdf", "report.pdf", b"%PDF-1.4").await;
        let bin = create_test_file(&state, "locked-pdf", "archive.bin", b"\x00\x01").await;

        let metadata = server
            .get(&format!("/api/v1/shares/locked-pdf/files/{}/metadata", pdf))
            .await
            .json::<Value>();
        assert_eq!(metadata["name"], "report.pdf");
        assert_eq!(metadata["size"], 8);
        assert_eq!(metadata["mimeType"], "application/pdf");
        assert_eq!(metadata["supportsPreview"], true);
        assert_eq!(metadata["previewType"], "pdf");

        let metadata = server
            .get(&format!("/api/v1/shares/locked-pdf/files/{}/metadata", bin))
            .await
            .json::<Value>();
        assert_eq!(metadata["mimeType"], "application/octet-stream");
        assert_eq!(metadata["supportsPreview"], false);
        assert_eq!(metadata["previewType"], "unsupported");

        let bytes = server
            .get(&format!("/api/v1/shares/locked-pdf/files/{}", pdf))
            .expect_failure()
            .await;
        assert_eq!(bytes.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(bytes.json::<Value>()["error"], "share_password_required");
    }

    #[tokio::test]
    async fn test_zip_only_served_when_ready() {
        let (server, state, _dir) = create_test_server();
        TestShare::new("zipped").locked().insert(&state.pool);
        let a = create_test_file(&state, "zipped", "A.txt", b"abc").await;
        let b = create_test_file(&state, "zipped", "B.txt", b"").await;

        let not_ready = server
            .get("/api/v1/shares/zipped/files/zip")
            .expect_failure()
            .await;
        assert_eq!(not_ready.status_code(), StatusCode::NOT_FOUND);

        let entries = [("A.txt", &a), ("B.txt", &b)]
            .iter()
            .map(|(name, id)| ArchiveEntry {
                name: name.to_string(),
                path: state.store.object_path("zipped", id).unwrap(),
            })
            .collect::<Vec<_>>();
        write_archive(&entries, &state.store.archive_path("zipped").unwrap(), 6).unwrap();
        {
            let conn = state.pool.get().unwrap();
            conn.execute("UPDATE shares SET is_zip_ready = 1 WHERE id = 'zipped'", [])
                .unwrap();
        }

        let ready = server.get("/api/v1/shares/zipped/files/zip").await;
        assert_eq!(ready.status_code(), StatusCode::OK);
        assert_eq!(ready.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            ready.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"zipped.zip\""
        );
        assert_eq!(&ready.as_bytes()[..2], b"PK");
    }

    #[tokio::test]
    async fn test_incomplete_files_hidden_and_removal() {
        let (server, state, temp_dir) = create_test_server();
        TestShare::new("wip").insert(&state.pool);
        let owner = owner_header_value(&state, "wip");

        let partial = server
            .post("/api/v1/shares/wip/files")
            .add_header(header::AUTHORIZATION, owner.clone())
            .add_query_param("name", "half.txt")
            .add_query_param("chunkIndex", 0)
            .add_query_param("totalChunks", 2)
            .bytes(b"half"[..].into())
            .await
            .json::<Value>();
        let partial_id = partial["fileId"].as_str().unwrap().to_string();

        let hidden = server
            .get(&format!("/api/v1/shares/wip/files/{}", partial_id))
            .expect_failure()
            .await;
        assert_eq!(hidden.status_code(), StatusCode::NOT_FOUND);

        let whole = upload_via_api(&server, &state, "wip", "whole.txt", &[b"ab", b"cd"]).await;

        let removed = server
            .delete(&format!("/api/v1/shares/wip/files/{}", whole))
            .add_header(header::AUTHORIZATION, owner)
            .await;
        assert_eq!(removed.status_code(), StatusCode::NO_CONTENT);
        assert!(!temp_dir.path().join("wip").join(&whole).exists());
    }
}
