//! Share visibility checks and capability token issuance.

use crate::auth::jwt::{create_share_token, verify_share_token};
use crate::auth::password::verify_password;
use crate::config::Config;
use crate::database::{execute_query, fetch_one, queries, DbConn};
use crate::error::{AppError, AppResult, ForbiddenReason};
use crate::models::Share;

pub fn find_share(conn: &DbConn, share_id: &str) -> AppResult<Option<Share>> {
    fetch_one(conn, queries::shares::SELECT_BY_ID, &[&share_id], Share::from_row)
}

/// Load a share that visitors may see at all. Absent and expired shares
/// are indistinguishable; a removed share reports its removal reason.
pub fn require_share(conn: &DbConn, share_id: &str) -> AppResult<Share> {
    let share = find_share(conn, share_id)?
        .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

    if let Some(reason) = &share.removed_reason {
        return Err(AppError::ShareRemoved(reason.clone()));
    }

    if share.is_expired() {
        return Err(AppError::NotFound("Share not found".to_string()));
    }

    Ok(share)
}

/// Like [`require_share`], but the share must also be finalized.
pub fn require_finalized_share(conn: &DbConn, share_id: &str) -> AppResult<Share> {
    let share = require_share(conn, share_id)?;
    if !share.upload_locked {
        return Err(AppError::NotFound("Share not found".to_string()));
    }
    Ok(share)
}

/// Check the capability token presented for a protected share.
///
/// Unprotected shares pass without a token. When the token is missing or
/// does not verify, the error tells the client what to do next.
pub fn authorize(share: &Share, token: Option<&str>, config: &Config) -> AppResult<()> {
    if !share.is_protected() {
        return Ok(());
    }

    if let Some(token) = token {
        if verify_share_token(share, token, config) {
            return Ok(());
        }
    }

    Err(AppError::Forbidden(denial_reason(share)))
}

fn denial_reason(share: &Share) -> ForbiddenReason {
    if views_exhausted(share) {
        ForbiddenReason::MaxViewsExceeded
    } else if share.password_hash().is_some() {
        ForbiddenReason::PasswordRequired
    } else {
        ForbiddenReason::PrivateShare
    }
}

fn views_exhausted(share: &Share) -> bool {
    share.max_views().is_some_and(|max| share.views >= max)
}

/// Exchange a password (when one is set) for a capability token.
///
/// Each successful issuance counts as exactly one view. A share whose view
/// cap is reached refuses further tokens.
pub fn issue_token(
    conn: &DbConn,
    share_id: &str,
    password: Option<&str>,
    config: &Config,
) -> AppResult<String> {
    let share = require_share(conn, share_id)?;

    if let Some(hash) = share.password_hash() {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(AppError::Forbidden(ForbiddenReason::PasswordRequired))?;

        if !verify_password(password, hash) {
            return Err(AppError::Forbidden(ForbiddenReason::WrongPassword));
        }
    }

    if views_exhausted(&share) {
        return Err(AppError::Forbidden(ForbiddenReason::MaxViewsExceeded));
    }

    let token = create_share_token(&share, config)?;
    execute_query(conn, queries::shares::INCREMENT_VIEWS, &[&share_id])?;

    tracing::debug!(share_id = %share_id, views = share.views + 1, "Share token issued");

    Ok(token)
}
