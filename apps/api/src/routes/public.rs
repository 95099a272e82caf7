use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};

use crate::access::require_share;
use crate::auth::AppState;
use crate::database::{fetch_one, get_connection, queries};
use crate::delivery::{public_link_headers, stream_file, Intent};
use crate::error::{AppError, AppResult};
use crate::models::{FileDownloadQuery, FileRecord};
use crate::utils::datetime::is_expired;

pub fn router() -> Router<AppState> {
    Router::new().route("/f/:token", get(get_public_file))
}

fn not_found() -> AppError {
    AppError::NotFound("File not found".to_string())
}

fn resolve_public_file(state: &AppState, token: &str) -> AppResult<FileRecord> {
    let conn = get_connection(&state.pool)?;

    let file = fetch_one(
        &conn,
        queries::files::SELECT_BY_PUBLIC_TOKEN,
        &[&token],
        FileRecord::from_row,
    )?
    .filter(|file| file.is_complete)
    .ok_or_else(not_found)?;

    if let Some(expires_at) = &file.public_token_expires_at {
        if is_expired(expires_at, chrono::Utc::now()) {
            return Err(not_found());
        }
    }

    require_share(&conn, &file.share_id).map_err(|_| not_found())?;

    Ok(file)
}

/// Fetch one file by its public link. No share password applies, and every
/// failure looks the same to the caller.
async fn get_public_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<FileDownloadQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let file = resolve_public_file(&state, &token)?;
    let download = Intent::from_flags(query.download.as_deref(), None) == Intent::Download;

    let handle = state
        .store
        .open_for_read(&file.share_id, &file.id)
        .await
        .map_err(|_| not_found())?;

    stream_file(handle, &headers, &public_link_headers(&file.name, download)).await
}
