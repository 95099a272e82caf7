use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::FileResponse;
use crate::utils::datetime::{is_expired, is_never};

#[derive(Debug, Clone)]
pub struct ShareSecurity {
    pub password_hash: Option<String>,
    pub max_views: Option<i64>,
}

/// A share row joined with its optional security record.
#[derive(Debug, Clone)]
pub struct Share {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub expiration: String,
    pub upload_locked: bool,
    pub is_zip_ready: bool,
    pub views: i64,
    pub removed_reason: Option<String>,
    pub created_at: String,
    pub security: Option<ShareSecurity>,
}

impl Share {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let security_share_id: Option<String> = row.get(9)?;
        let security = match security_share_id {
            Some(_) => Some(ShareSecurity {
                password_hash: row.get(10)?,
                max_views: row.get(11)?,
            }),
            None => None,
        };

        Ok(Share {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            expiration: row.get(3)?,
            upload_locked: row.get::<_, i64>(4)? != 0,
            is_zip_ready: row.get::<_, i64>(5)? != 0,
            views: row.get(6)?,
            removed_reason: row.get(7)?,
            created_at: row.get(8)?,
            security,
        })
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.security.as_ref()?.password_hash.as_deref()
    }

    pub fn max_views(&self) -> Option<i64> {
        self.security.as_ref()?.max_views
    }

    /// A share with neither password nor view cap needs no capability token.
    pub fn is_protected(&self) -> bool {
        self.password_hash().is_some() || self.max_views().is_some()
    }

    pub fn expires_never(&self) -> bool {
        is_never(&self.expiration)
    }

    pub fn is_expired(&self) -> bool {
        is_expired(&self.expiration, chrono::Utc::now())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShareSecurityRequest {
    #[validate(length(min = 1, max = 128))]
    pub password: Option<String>,
    #[validate(range(min = 1))]
    pub max_views: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreateRequest {
    pub id: Option<String>,
    #[validate(length(min = 3, max = 30))]
    pub name: Option<String>,
    #[validate(length(max = 512))]
    pub description: Option<String>,
    #[serde(default = "default_expiration")]
    pub expiration: String,
    #[validate(nested)]
    pub security: Option<ShareSecurityRequest>,
}

fn default_expiration() -> String {
    "never".to_string()
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShareUpdateRequest {
    #[validate(length(min = 3, max = 30))]
    pub name: Option<String>,
    #[validate(length(max = 512))]
    pub description: Option<String>,
    pub expiration: Option<String>,
    #[validate(nested)]
    pub security: Option<ShareSecurityRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSecurityResponse {
    pub password_protected: bool,
    pub max_views: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub expiration: String,
    pub upload_locked: bool,
    pub is_zip_ready: bool,
    pub views: i64,
    pub has_password: bool,
    pub security: ShareSecurityResponse,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileResponse>>,
}

impl ShareResponse {
    pub fn new(share: &Share, files: Option<Vec<FileResponse>>) -> Self {
        Self {
            id: share.id.clone(),
            name: share.name.clone(),
            description: share.description.clone(),
            expiration: share.expiration.clone(),
            upload_locked: share.upload_locked,
            is_zip_ready: share.is_zip_ready,
            views: share.views,
            has_password: share.password_hash().is_some(),
            security: ShareSecurityResponse {
                password_protected: share.password_hash().is_some(),
                max_views: share.max_views(),
            },
            created_at: share.created_at.clone(),
            files,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreatedResponse {
    #[serde(flatten)]
    pub share: ShareResponse,
    pub owner_token: String,
    pub chunk_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMetaDataResponse {
    pub id: String,
    pub created_at: String,
    pub is_zip_ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareIdAvailabilityResponse {
    pub is_available: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTokenRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTokenResponse {
    pub token: String,
}
