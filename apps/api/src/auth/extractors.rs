use crate::auth::jwt::decode_owner_token;
use crate::config::Config;
use crate::constants::SHARE_TOKEN_HEADER;
use crate::database::DbPool;
use crate::error::AppError;
use crate::storage::ChunkStore;
use axum::{
    extract::{FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub store: ChunkStore,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The caller holds the owner token of the share named by the `:id` path
/// segment.
#[derive(Clone, Debug)]
pub struct ShareOwner {
    pub share_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ShareOwner
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Authentication("Not authenticated".to_string()))?;

        let claims = decode_owner_token(token, &app_state.config)
            .ok_or_else(|| AppError::Authentication("Invalid or expired token".to_string()))?;

        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Missing share id".to_string()))?;

        match params.get("id") {
            Some(id) if *id == claims.sub => Ok(ShareOwner { share_id: claims.sub }),
            _ => Err(AppError::Authentication(
                "Token does not grant access to this share".to_string(),
            )),
        }
    }
}

/// Capability token presented by a visitor, if any. Read from the
/// `X-Share-Token` header, then from the `token` query parameter so plain
/// links work.
#[derive(Clone, Debug, Default)]
pub struct ShareAccessToken(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ShareAccessToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(SHARE_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if from_header.is_some() {
            return Ok(ShareAccessToken(from_header));
        }

        let from_query = parts
            .uri
            .query()
            .and_then(|query| serde_urlencoded::from_str::<TokenQuery>(query).ok())
            .and_then(|params| params.token)
            .filter(|value| !value.is_empty());

        Ok(ShareAccessToken(from_query))
    }
}

// Helper trait for extracting AppState from state
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

impl FromRef<AppState> for AppState {
    fn from_ref(input: &AppState) -> Self {
        input.clone()
    }
}
