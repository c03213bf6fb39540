//! Connection pool construction and base schema migration for the Store.
//!
//! Ported from Python SQLAlchemy to a Rust `sqlx` pool, against this
//! pipeline's own domain schema.

mod error;
mod schema;

pub use error::{DbError, Result};

use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Open (creating if necessary) a SQLite-backed pool and apply the base schema.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<SqlitePool> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(pool_size)
        .connect_with(connect_opts)
        .await?;

    migrate(&pool).await?;
    info!(database_url, "store connected and migrated");
    Ok(pool)
}

/// Idempotently create the base (kind-independent) tables and indexes.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(schema::CREATE_WORK_ITEMS).execute(pool).await?;
    sqlx::query(schema::CREATE_ATTACHMENTS).execute(pool).await?;
    sqlx::query(schema::CREATE_HASH_LOOKUP).execute(pool).await?;
    sqlx::query(schema::CREATE_UNKNOWN_HASHES).execute(pool).await?;
    sqlx::query(schema::CREATE_PROCESSING_ERRORS).execute(pool).await?;
    for stmt in schema::CREATE_INDEXES {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Columns present on `work_items`, used by `tipflow_store` to decide which
/// per-kind mapped columns still need to be added.
pub async fn existing_work_item_columns(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as("PRAGMA table_info(work_items)")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.1).collect())
}

/// Add a nullable column to `work_items` if it isn't already there.
pub async fn ensure_work_item_column(pool: &SqlitePool, column: &str, sql_type: &str) -> Result<()> {
    let existing = existing_work_item_columns(pool).await?;
    if existing.iter().any(|c| c == column) {
        return Ok(());
    }
    let stmt = format!("ALTER TABLE work_items ADD COLUMN \"{column}\" {sql_type}");
    sqlx::query(&stmt).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_base_tables() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let cols = existing_work_item_columns(&pool).await.unwrap();
        assert!(cols.contains(&"tip".to_string()));
        assert!(cols.contains(&"status".to_string()));
    }

    #[tokio::test]
    async fn ensure_work_item_column_is_idempotent() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        ensure_work_item_column(&pool, "vehicle_hash", "TEXT").await.unwrap();
        ensure_work_item_column(&pool, "vehicle_hash", "TEXT").await.unwrap();
        let cols = existing_work_item_columns(&pool).await.unwrap();
        assert_eq!(cols.iter().filter(|c| *c == "vehicle_hash").count(), 1);
    }
}
