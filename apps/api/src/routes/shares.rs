use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use crate::access::{authorize, find_share, issue_token, require_finalized_share};
use crate::archive::spawn_share_archive;
use crate::auth::jwt::create_owner_token;
use crate::auth::password::hash_password;
use crate::auth::{AppState, ShareAccessToken, ShareOwner};
use crate::config::ShareConfig;
use crate::constants::{GENERATED_SHARE_ID_LEN, SHARE_ID_MAX_LEN, SHARE_ID_MIN_LEN};
use crate::database::{execute_query, fetch_all, fetch_one, get_connection, queries, DbConn};
use crate::error::{AppError, AppResult};
use crate::models::{
    FileRecord, FileResponse, Share, ShareCreateRequest, ShareCreatedResponse,
    ShareIdAvailabilityResponse, ShareMetaDataResponse, ShareResponse, ShareSecurityRequest,
    ShareTokenRequest, ShareTokenResponse, ShareUpdateRequest,
};
use crate::utils::datetime::{
    checked_offset, expiration_instant, now_string, parse_relative_expiration,
};
use crate::utils::random_token;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shares", post(create_share))
        .route(
            "/shares/:id",
            get(get_share).patch(update_share).delete(remove_share),
        )
        .route("/shares/:id/available", get(is_share_id_available))
        .route("/shares/:id/metadata", get(get_share_metadata))
        .route("/shares/:id/complete", post(complete_share))
        .route("/shares/:id/revert-complete", post(revert_complete))
        .route("/shares/:id/token", post(create_share_token))
}

fn validate_share_id(id: &str) -> AppResult<()> {
    let valid_len = (SHARE_ID_MIN_LEN..=SHARE_ID_MAX_LEN).contains(&id.len());
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Share id must be {}-{} characters of letters, digits, '-' or '_'",
            SHARE_ID_MIN_LEN, SHARE_ID_MAX_LEN
        )))
    }
}

fn share_exists(conn: &DbConn, id: &str) -> AppResult<bool> {
    let found = fetch_one(conn, queries::shares::CHECK_EXISTS, &[&id], |row| {
        row.get::<_, String>(0)
    })?;
    Ok(found.is_some())
}

/// Turn a relative expiration into the stored value, within the configured
/// maximum lifetime.
fn resolve_expiration(value: &str, limits: &ShareConfig, now: DateTime<Utc>) -> AppResult<String> {
    let expiration = parse_relative_expiration(value, now)
        .ok_or_else(|| AppError::Validation(format!("Invalid expiration: {}", value)))?;

    if limits.max_expiration_hours > 0 {
        // A cap too large to represent bounds nothing.
        let latest = checked_offset(now, Duration::try_hours(limits.max_expiration_hours));
        let within = match (expiration_instant(&expiration), latest) {
            (Some(at), Some(latest)) => at <= latest,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !within {
            return Err(AppError::Validation(
                "Expiration date exceeds maximum expiration date".to_string(),
            ));
        }
    }

    Ok(expiration)
}

fn hash_share_password(password: &str) -> AppResult<String> {
    hash_password(password).map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

fn load_files(conn: &DbConn, share_id: &str) -> AppResult<Vec<FileRecord>> {
    fetch_all(
        conn,
        queries::files::SELECT_ALL_FOR_SHARE,
        &[&share_id],
        FileRecord::from_row,
    )
}

fn owned_share(conn: &DbConn, owner: &ShareOwner) -> AppResult<Share> {
    find_share(conn, &owner.share_id)?
        .ok_or_else(|| AppError::NotFound("Share not found".to_string()))
}

fn owner_view(conn: &DbConn, share: &Share) -> AppResult<ShareResponse> {
    let files = load_files(conn, &share.id)?
        .iter()
        .map(|file| FileResponse::new(file, true))
        .collect();
    Ok(ShareResponse::new(share, Some(files)))
}

fn apply_security(conn: &DbConn, share_id: &str, security: &ShareSecurityRequest) -> AppResult<()> {
    if let Some(password) = &security.password {
        let hash = hash_share_password(password)?;
        execute_query(conn, queries::security::UPSERT_PASSWORD, &[&share_id, &hash])?;
    }
    if let Some(max_views) = security.max_views {
        execute_query(conn, queries::security::UPSERT_MAX_VIEWS, &[&share_id, &max_views])?;
    }
    Ok(())
}

async fn create_share(
    State(state): State<AppState>,
    Json(request): Json<ShareCreateRequest>,
) -> AppResult<(StatusCode, Json<ShareCreatedResponse>)> {
    request.validate()?;
    let expiration = resolve_expiration(&request.expiration, &state.config.share, Utc::now())?;

    let share = {
        let conn = get_connection(&state.pool)?;

        let id = match &request.id {
            Some(id) => {
                validate_share_id(id)?;
                if share_exists(&conn, id)? {
                    return Err(AppError::Conflict("Share id already in use".to_string()));
                }
                id.clone()
            }
            None => loop {
                let candidate = random_token(GENERATED_SHARE_ID_LEN);
                if !share_exists(&conn, &candidate)? {
                    break candidate;
                }
            },
        };

        execute_query(
            &conn,
            queries::shares::INSERT,
            &[
                &id,
                &request.name,
                &request.description,
                &expiration,
                &now_string(),
            ],
        )?;

        if let Some(security) = &request.security {
            if security.password.is_some() || security.max_views.is_some() {
                let hash = security
                    .password
                    .as_deref()
                    .map(hash_share_password)
                    .transpose()?;
                execute_query(
                    &conn,
                    queries::security::INSERT,
                    &[&id, &hash, &security.max_views],
                )?;
            }
        }

        find_share(&conn, &id)?
            .ok_or_else(|| AppError::Internal("Share vanished after insert".to_string()))?
    };

    state.store.ensure_share_directory(&share.id).await?;
    let owner_token = create_owner_token(&share.id, &state.config)?;

    tracing::info!(share_id = %share.id, protected = share.is_protected(), "Share created");

    Ok((
        StatusCode::CREATED,
        Json(ShareCreatedResponse {
            share: ShareResponse::new(&share, Some(Vec::new())),
            owner_token,
            chunk_size: state.config.share.chunk_size,
        }),
    ))
}

async fn is_share_id_available(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ShareIdAvailabilityResponse>> {
    let conn = get_connection(&state.pool)?;
    Ok(Json(ShareIdAvailabilityResponse {
        is_available: !share_exists(&conn, &id)?,
    }))
}

async fn get_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ShareAccessToken(token): ShareAccessToken,
) -> AppResult<Json<ShareResponse>> {
    let conn = get_connection(&state.pool)?;
    let share = require_finalized_share(&conn, &id)?;
    authorize(&share, token.as_deref(), &state.config)?;

    let files = load_files(&conn, &share.id)?
        .iter()
        .filter(|file| file.is_complete)
        .map(|file| FileResponse::new(file, false))
        .collect();

    Ok(Json(ShareResponse::new(&share, Some(files))))
}

async fn get_share_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ShareMetaDataResponse>> {
    let conn = get_connection(&state.pool)?;
    let share = require_finalized_share(&conn, &id)?;

    Ok(Json(ShareMetaDataResponse {
        id: share.id,
        created_at: share.created_at,
        is_zip_ready: share.is_zip_ready,
    }))
}

async fn update_share(
    State(state): State<AppState>,
    owner: ShareOwner,
    Json(request): Json<ShareUpdateRequest>,
) -> AppResult<Json<ShareResponse>> {
    request.validate()?;
    let expiration = request
        .expiration
        .as_deref()
        .map(|value| resolve_expiration(value, &state.config.share, Utc::now()))
        .transpose()?;

    let conn = get_connection(&state.pool)?;
    owned_share(&conn, &owner)?;

    execute_query(
        &conn,
        queries::shares::UPDATE_DETAILS,
        &[
            &request.name,
            &request.description,
            &expiration,
            &owner.share_id,
        ],
    )?;

    if let Some(security) = &request.security {
        apply_security(&conn, &owner.share_id, security)?;
    }

    let share = owned_share(&conn, &owner)?;
    Ok(Json(owner_view(&conn, &share)?))
}

async fn remove_share(State(state): State<AppState>, owner: ShareOwner) -> AppResult<StatusCode> {
    {
        let conn = get_connection(&state.pool)?;
        owned_share(&conn, &owner)?;
    }

    state.store.delete_all(&owner.share_id).await?;

    let conn = get_connection(&state.pool)?;
    execute_query(&conn, queries::shares::DELETE, &[&owner.share_id])?;

    tracing::info!(share_id = %owner.share_id, "Share removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Finalize a share: lock uploads and, for multi-file shares, build the
/// archive in the background.
async fn complete_share(
    State(state): State<AppState>,
    owner: ShareOwner,
) -> AppResult<(StatusCode, Json<ShareResponse>)> {
    let conn = get_connection(&state.pool)?;
    let share = owned_share(&conn, &owner)?;

    if share.upload_locked {
        return Err(AppError::BadRequest("Share already completed".to_string()));
    }

    let (total, receiving): (i64, i64) = fetch_one(
        &conn,
        queries::files::COUNT_FOR_SHARE,
        &[&owner.share_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?
    .unwrap_or((0, 0));

    if total == 0 {
        return Err(AppError::BadRequest(
            "You need at least one file in your share to complete it".to_string(),
        ));
    }
    if receiving > 0 {
        return Err(AppError::Conflict(
            "Some files are still being uploaded".to_string(),
        ));
    }

    let locked = execute_query(&conn, queries::shares::LOCK_UPLOADS, &[&owner.share_id])?;
    if locked == 0 {
        return Err(AppError::BadRequest("Share already completed".to_string()));
    }

    if total > 1 {
        spawn_share_archive(
            state.pool.clone(),
            state.store.clone(),
            owner.share_id.clone(),
            state.config.storage.zip_compression_level,
        );
    }

    tracing::info!(share_id = %owner.share_id, files = total, "Share completed");

    let share = owned_share(&conn, &owner)?;
    Ok((StatusCode::ACCEPTED, Json(owner_view(&conn, &share)?)))
}

async fn revert_complete(
    State(state): State<AppState>,
    owner: ShareOwner,
) -> AppResult<Json<ShareResponse>> {
    let conn = get_connection(&state.pool)?;
    owned_share(&conn, &owner)?;

    execute_query(&conn, queries::shares::REVERT_COMPLETE, &[&owner.share_id])?;

    let share = owned_share(&conn, &owner)?;
    Ok(Json(owner_view(&conn, &share)?))
}

async fn create_share_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<ShareTokenRequest>>,
) -> AppResult<Json<ShareTokenResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let conn = get_connection(&state.pool)?;
    let token = issue_token(&conn, &id, request.password.as_deref(), &state.config)?;

    Ok(Json(ShareTokenResponse { token }))
}
