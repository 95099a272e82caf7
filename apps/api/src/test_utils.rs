#![cfg(test)]

use crate::app::create_app;
use crate::auth::jwt::create_owner_token;
use crate::auth::password::hash_password;
use crate::auth::AppState;
use crate::config::Config;
use crate::constants::NEVER_EXPIRES;
use crate::database::{init_database, DbConn, DbPool};
use crate::storage::ChunkStore;
use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

static FILE_ID_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Create an in-memory SQLite database pool with full schema applied
pub fn create_test_db() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(())
    });

    // A memory database lives and dies with its connection, so the pool
    // holds exactly one.
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test database pool");

    let conn = pool.get().expect("Failed to get connection from pool");
    init_database(&conn).expect("Failed to initialize test database schema");

    pool
}

/// Application state over an in-memory database and a temporary shares
/// directory. Keep the `TempDir` alive for the duration of the test.
pub fn create_test_state() -> (AppState, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let mut config = Config::default();
    config.storage.shares_dir = temp_dir.path().to_path_buf();

    let state = AppState {
        store: ChunkStore::new(temp_dir.path()),
        config: Arc::new(config),
        pool: create_test_db(),
    };

    (state, temp_dir)
}

/// Create a test app with in-memory database
pub fn create_test_app() -> (Router, AppState, TempDir) {
    let (state, temp_dir) = create_test_state();
    let app = create_app(state.clone());
    (app, state, temp_dir)
}

/// `TestServer` over a fresh test app.
pub fn create_test_server() -> (TestServer, AppState, TempDir) {
    let (app, state, temp_dir) = create_test_app();
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, state, temp_dir)
}

/// Upload `chunks` as one file through the HTTP API and return its id.
pub async fn upload_via_api(
    server: &TestServer,
    state: &AppState,
    share_id: &str,
    name: &str,
    chunks: &[&[u8]],
) -> String {
    let mut file_id: Option<String> = None;

    for (index, chunk) in chunks.iter().enumerate() {
        let mut request = server
            .post(&format!("/api/v1/shares/{}/files", share_id))
            .add_header(AUTHORIZATION, owner_header_value(state, share_id))
            .add_query_param("name", name)
            .add_query_param("chunkIndex", index)
            .add_query_param("totalChunks", chunks.len())
            .bytes(chunk.to_vec().into());
        if let Some(id) = &file_id {
            request = request.add_query_param("fileId", id);
        }

        let body = request.await.json::<serde_json::Value>();
        file_id = Some(body["fileId"].as_str().expect("fileId in response").to_string());
    }

    file_id.expect("at least one chunk")
}

pub fn owner_header_value(state: &AppState, share_id: &str) -> HeaderValue {
    HeaderValue::from_str(&owner_header(state, share_id)).expect("valid header")
}

/// Builder for share rows that skips the HTTP create flow.
pub struct TestShare {
    pub id: String,
    pub expiration: String,
    pub password: Option<String>,
    pub max_views: Option<i64>,
    pub upload_locked: bool,
    pub views: i64,
    pub removed_reason: Option<String>,
}

impl TestShare {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            expiration: NEVER_EXPIRES.to_string(),
            password: None,
            max_views: None,
            upload_locked: false,
            views: 0,
            removed_reason: None,
        }
    }

    pub fn locked(mut self) -> Self {
        self.upload_locked = true;
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn max_views(mut self, max_views: i64) -> Self {
        self.max_views = Some(max_views);
        self
    }

    pub fn views(mut self, views: i64) -> Self {
        self.views = views;
        self
    }

    pub fn expiration(mut self, expiration: &str) -> Self {
        self.expiration = expiration.to_string();
        self
    }

    pub fn removed(mut self, reason: &str) -> Self {
        self.removed_reason = Some(reason.to_string());
        self
    }

    pub fn insert(self, pool: &DbPool) -> String {
        let conn = pool.get().expect("Failed to get connection");

        conn.execute(
            "INSERT INTO shares (id, name, expiration, upload_locked, views, removed_reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id,
                format!("Share {}", self.id),
                self.expiration,
                self.upload_locked as i64,
                self.views,
                self.removed_reason,
                "2024-01-15T10:30:00.000Z",
            ],
        )
        .expect("Failed to insert test share");

        if self.password.is_some() || self.max_views.is_some() {
            let hash = self
                .password
                .as_deref()
                .map(|p| hash_password(p).expect("Failed to hash password"));
            conn.execute(
                "INSERT INTO share_security (share_id, password_hash, max_views) VALUES (?, ?, ?)",
                rusqlite::params![self.id, hash, self.max_views],
            )
            .expect("Failed to insert share security");
        }

        self.id
    }
}

/// Test fixture: a completed file with its bytes already in the store.
pub async fn create_test_file(state: &AppState, share_id: &str, name: &str, bytes: &[u8]) -> String {
    let file_id = format!("file-{}", FILE_ID_COUNTER.fetch_add(1, Ordering::SeqCst));

    state
        .store
        .append_chunk(share_id, &file_id, 0, bytes)
        .await
        .expect("Failed to write test file");

    let conn = state.pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO files (id, share_id, name, size, is_complete) VALUES (?, ?, ?, ?, 1)",
        rusqlite::params![file_id, share_id, name, bytes.len() as i64],
    )
    .expect("Failed to insert test file");

    file_id
}

pub fn owner_header(state: &AppState, share_id: &str) -> String {
    let token = create_owner_token(share_id, &state.config).expect("Failed to sign owner token");
    format!("Bearer {}", token)
}

pub fn share_views(conn: &DbConn, share_id: &str) -> i64 {
    conn.query_row("SELECT views FROM shares WHERE id = ?", [share_id], |row| row.get(0))
        .expect("Failed to read views")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_db() {
        let pool = create_test_db();
        let conn = pool.get().expect("Failed to get connection");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('shares', 'files', 'share_security', 'upload_sessions')",
                [],
                |row| row.get(0),
            )
            .expect("Failed to query schema");

        assert_eq!(count, 4);
    }

    #[test]
    fn test_test_share_builder_inserts_security() {
        let pool = create_test_db();
        let id = TestShare::new("secured").password("pw").max_views(3).insert(&pool);

        let conn = pool.get().expect("Failed to get connection");
        let max_views: i64 = conn
            .query_row(
                "SELECT max_views FROM share_security WHERE share_id = ?",
                [&id],
                |row| row.get(0),
            )
            .expect("Failed to query security");

        assert_eq!(max_views, 3);
    }

    #[tokio::test]
    async fn test_create_test_file_writes_bytes() {
        let (state, temp_dir) = create_test_state();
        let share_id = TestShare::new("s1").insert(&state.pool);

        let file_id = create_test_file(&state, &share_id, "a.txt", b"abc").await;

        let on_disk = std::fs::read(temp_dir.path().join(&share_id).join(&file_id)).unwrap();
        assert_eq!(on_disk, b"abc");
    }
}
