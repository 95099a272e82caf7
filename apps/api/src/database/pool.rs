use crate::error::{AppError, AppResult};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Row;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

pub fn create_pool(path: &Path) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        Ok(())
    });

    Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(|e| AppError::Internal(format!("Failed to create database pool: {}", e)))
}

pub fn get_connection(pool: &DbPool) -> AppResult<DbConn> {
    pool.get().map_err(AppError::Pool)
}

pub fn fetch_one<T, F>(
    conn: &DbConn,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
    mapper: F,
) -> AppResult<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;

    match rows.next()? {
        Some(row) => Ok(Some(mapper(row)?)),
        None => Ok(None),
    }
}

pub fn fetch_all<T, F>(
    conn: &DbConn,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
    mapper: F,
) -> AppResult<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, mapper)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn execute_query(conn: &DbConn, sql: &str, params: &[&dyn rusqlite::ToSql]) -> AppResult<usize> {
    conn.execute(sql, params).map_err(AppError::Database)
}
