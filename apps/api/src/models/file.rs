use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub share_id: String,
    pub name: String,
    pub size: i64,
    pub is_complete: bool,
    pub public_token: Option<String>,
    pub public_token_expires_at: Option<String>,
}

impl FileRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(FileRecord {
            id: row.get(0)?,
            share_id: row.get(1)?,
            name: row.get(2)?,
            size: row.get(3)?,
            is_complete: row.get::<_, i64>(4)? != 0,
            public_token: row.get(5)?,
            public_token_expires_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_token: Option<String>,
}

impl FileResponse {
    pub fn new(file: &FileRecord, include_public_token: bool) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            size: file.size,
            is_complete: file.is_complete,
            public_token: if include_public_token {
                file.public_token.clone()
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadQuery {
    #[serde(alias = "id")]
    pub file_id: Option<String>,
    pub name: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub file_id: String,
    pub file_name: String,
    pub is_complete: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataResponse {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub supports_preview: bool,
    pub preview_type: String,
}

#[derive(Debug, Deserialize)]
pub struct FileDownloadQuery {
    pub download: Option<String>,
    pub preview: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLinkRequest {
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLinkResponse {
    pub token: String,
    pub url: String,
    pub expires_at: Option<String>,
}
