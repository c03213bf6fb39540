use chrono::Utc;
use sqlx::SqlitePool;
use tipflow_protocol::{AttachmentStatus, ValidationStatus};

use crate::error::Result;
use crate::models::AttachmentRow;

pub async fn get(
    pool: &SqlitePool,
    record_tip: &str,
    attachment_tip: &str,
) -> Result<Option<AttachmentRow>> {
    let row = sqlx::query_as::<_, AttachmentRow>(
        "SELECT * FROM attachments WHERE record_tip = ? AND attachment_tip = ?",
    )
    .bind(record_tip)
    .bind(attachment_tip)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Start (or restart) a download attempt.
pub async fn begin_download(
    pool: &SqlitePool,
    record_tip: &str,
    attachment_tip: &str,
    sequence: i64,
    filename: &str,
    file_path: &str,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO attachments
            (record_tip, attachment_tip, sequence, filename, file_path, status,
             validation_status, download_started_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(record_tip, attachment_tip) DO UPDATE SET
            sequence = excluded.sequence,
            filename = excluded.filename,
            file_path = excluded.file_path,
            status = excluded.status,
            validation_status = excluded.validation_status,
            download_started_at = excluded.download_started_at
        "#,
    )
    .bind(record_tip)
    .bind(attachment_tip)
    .bind(sequence)
    .bind(filename)
    .bind(file_path)
    .bind(AttachmentStatus::Downloading)
    .bind(ValidationStatus::Pending)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_complete(
    pool: &SqlitePool,
    record_tip: &str,
    attachment_tip: &str,
    file_size_bytes: i64,
    file_hash_md5: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE attachments
        SET status = ?, validation_status = ?, file_size_bytes = ?, file_hash_md5 = ?,
            download_completed_at = ?, last_error = NULL
        WHERE record_tip = ? AND attachment_tip = ?
        "#,
    )
    .bind(AttachmentStatus::Complete)
    .bind(ValidationStatus::Valid)
    .bind(file_size_bytes)
    .bind(file_hash_md5)
    .bind(Utc::now())
    .bind(record_tip)
    .bind(attachment_tip)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &SqlitePool,
    record_tip: &str,
    attachment_tip: &str,
    last_error: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE attachments
        SET status = ?, validation_status = ?, last_error = ?, download_completed_at = ?
        WHERE record_tip = ? AND attachment_tip = ?
        "#,
    )
    .bind(AttachmentStatus::Failed)
    .bind(ValidationStatus::ValidationFailed)
    .bind(last_error)
    .bind(Utc::now())
    .bind(record_tip)
    .bind(attachment_tip)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_complete(pool: &SqlitePool, record_tip: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM attachments WHERE record_tip = ? AND status = ?",
    )
    .bind(record_tip)
    .bind(AttachmentStatus::Complete)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn download_lifecycle() {
        let pool = tipflow_db::connect("sqlite::memory:", 1).await.unwrap();
        begin_download(&pool, "rec1", "att1", 1, "a.jpg", "/tmp/a.jpg").await.unwrap();
        let row = get(&pool, "rec1", "att1").await.unwrap().unwrap();
        assert_eq!(row.status, AttachmentStatus::Downloading);

        mark_complete(&pool, "rec1", "att1", 5000, "deadbeef").await.unwrap();
        let row = get(&pool, "rec1", "att1").await.unwrap().unwrap();
        assert_eq!(row.status, AttachmentStatus::Complete);
        assert_eq!(row.file_hash_md5.as_deref(), Some("deadbeef"));
        assert_eq!(count_complete(&pool, "rec1").await.unwrap(), 1);
    }
}
