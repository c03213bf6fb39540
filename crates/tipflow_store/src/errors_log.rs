use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;

/// Append a `ProcessingError` row.
pub async fn record(
    pool: &SqlitePool,
    tip: &str,
    error_type: &str,
    error_message: &str,
    error_details_json: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO processing_errors (tip, error_type, error_message, error_details_json, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(tip)
    .bind(error_type)
    .bind(error_message)
    .bind(error_details_json)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
