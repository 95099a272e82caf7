//! Signed tokens.
//!
//! Two kinds share the HMAC secret: capability tokens prove that a visitor
//! passed a share's access checks, owner tokens authorize managing a share.
//! The `type` claim keeps one from being accepted as the other.

use crate::config::Config;
use crate::error::AppResult;
use crate::models::Share;
use crate::utils::datetime::{expiration_instant, parse_datetime};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const SHARE_TOKEN_TYPE: &str = "share";
const OWNER_TOKEN_TYPE: &str = "owner";

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareTokenClaims {
    pub share_id: String,
    /// Creation instant of the share incarnation, in milliseconds.
    pub share_created_at: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(rename = "type")]
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

fn created_at_millis(share: &Share) -> i64 {
    parse_datetime(&share.created_at)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

/// Mint a capability token for `share`. It expires with the share, or never.
pub fn create_share_token(share: &Share, config: &Config) -> AppResult<String> {
    let claims = ShareTokenClaims {
        share_id: share.id.clone(),
        share_created_at: created_at_millis(share),
        iat: Utc::now().timestamp(),
        exp: expiration_instant(&share.expiration).map(|dt| dt.timestamp()),
        token_type: SHARE_TOKEN_TYPE.to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.security.secret_key.as_bytes()),
    )?;

    Ok(token)
}

/// True only when `token` is a well-formed, unexpired capability token for
/// this exact incarnation of `share`.
pub fn verify_share_token(share: &Share, token: &str, config: &Config) -> bool {
    let mut validation = Validation::default();
    validation.leeway = 0;
    if share.expires_never() {
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
    }

    match decode::<ShareTokenClaims>(
        token,
        &DecodingKey::from_secret(config.security.secret_key.as_bytes()),
        &validation,
    ) {
        Ok(data) => {
            data.claims.token_type == SHARE_TOKEN_TYPE
                && data.claims.share_id == share.id
                && data.claims.share_created_at == created_at_millis(share)
        }
        Err(_) => false,
    }
}

pub fn create_owner_token(share_id: &str, config: &Config) -> AppResult<String> {
    let expiration = Utc::now() + Duration::days(config.security.owner_token_expire_days);

    let claims = OwnerClaims {
        sub: share_id.to_string(),
        exp: expiration.timestamp(),
        token_type: OWNER_TOKEN_TYPE.to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.security.secret_key.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_owner_token(token: &str, config: &Config) -> Option<OwnerClaims> {
    let validation = Validation::default();

    match decode::<OwnerClaims>(
        token,
        &DecodingKey::from_secret(config.security.secret_key.as_bytes()),
        &validation,
    ) {
        Ok(data) if data.claims.token_type == OWNER_TOKEN_TYPE => Some(data.claims),
        _ => None,
    }
}
