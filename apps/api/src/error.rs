use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::storage::StorageError;

/// Why a protected share refused access. Serialized as the `error`
/// discriminator so clients can decide between prompting and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    PasswordRequired,
    WrongPassword,
    MaxViewsExceeded,
    PrivateShare,
}

impl ForbiddenReason {
    pub fn code(&self) -> &'static str {
        match self {
            ForbiddenReason::PasswordRequired => "share_password_required",
            ForbiddenReason::WrongPassword => "wrong_password",
            ForbiddenReason::MaxViewsExceeded => "share_max_views_exceeded",
            ForbiddenReason::PrivateShare => "private_share",
        }
    }
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenReason::PasswordRequired => write!(f, "This share is password protected"),
            ForbiddenReason::WrongPassword => write!(f, "Wrong password"),
            ForbiddenReason::MaxViewsExceeded => write!(f, "Maximum views exceeded"),
            ForbiddenReason::PrivateShare => write!(f, "A share token is required"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Forbidden(ForbiddenReason),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Share removed: {0}")]
    ShareRemoved(String),

    #[error("Unexpected chunk index, expected {expected}")]
    UnexpectedChunkIndex { expected: i64 },

    #[error("Share is locked for uploads")]
    ShareLocked,

    #[error("File upload already completed")]
    FileComplete,

    #[error("File exceeds the maximum size of {max} bytes")]
    FileTooLarge { max: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(e: ArchiveError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", msg.clone())
            }
            AppError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason.code(), reason.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::ShareRemoved(reason) => (StatusCode::NOT_FOUND, "share_removed", reason.clone()),
            AppError::UnexpectedChunkIndex { expected } => {
                let body = Json(json!({
                    "detail": self.to_string(),
                    "error": "unexpected_chunk_index",
                    "expectedChunkIndex": expected,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::ShareLocked => (StatusCode::CONFLICT, "share_locked", self.to_string()),
            AppError::FileComplete => (StatusCode::CONFLICT, "file_complete", self.to_string()),
            AppError::FileTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "file_too_large", self.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::RangeNotSatisfiable { size } => {
                let body = Json(json!({
                    "detail": self.to_string(),
                    "error": "range_not_satisfiable",
                }));
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(axum::http::header::CONTENT_RANGE, format!("bytes */{}", size))],
                    body,
                )
                    .into_response();
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Storage error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Database error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Connection pool error".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::error!("JWT error: {}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthenticated",
                    "Invalid token".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "IO error".to_string(),
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    "JSON parsing error".to_string(),
                )
            }
        };

        let body = Json(json!({ "detail": message, "error": code }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
