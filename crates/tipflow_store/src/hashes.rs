use chrono::Utc;
use sqlx::SqlitePool;
use tipflow_protocol::LookupType;

use crate::error::Result;
use crate::models::{HashEntry, UnknownHash};

/// Full hash dictionary, used by `HashResolver` to materialise its cache.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<HashEntry>> {
    let rows = sqlx::query_as::<_, HashEntry>("SELECT * FROM hash_lookup").fetch_all(pool).await?;
    Ok(rows)
}

/// Full-refresh load from an authoritative export.
pub async fn replace_all(pool: &SqlitePool, entries: &[(String, LookupType, String, String)]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM hash_lookup").execute(&mut *tx).await?;
    let now = Utc::now();
    for (tip_hash, lookup_type, resolved_value, source_type) in entries {
        sqlx::query(
            r#"
            INSERT INTO hash_lookup (tip_hash, lookup_type, resolved_value, source_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tip_hash)
        .bind(lookup_type)
        .bind(resolved_value)
        .bind(source_type)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Manually resolve one hash, preserving `(tip_hash, lookup_type)` identity.
pub async fn upsert_one(
    pool: &SqlitePool,
    tip_hash: &str,
    lookup_type: LookupType,
    resolved_value: &str,
    source_type: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO hash_lookup (tip_hash, lookup_type, resolved_value, source_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(tip_hash, lookup_type) DO UPDATE SET
            resolved_value = excluded.resolved_value,
            source_type = COALESCE(excluded.source_type, hash_lookup.source_type),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(tip_hash)
    .bind(lookup_type)
    .bind(resolved_value)
    .bind(source_type)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        "UPDATE unknown_hashes SET resolved_at = ?, resolved_value = ? WHERE tip_hash = ? AND lookup_type = ?",
    )
    .bind(now)
    .bind(resolved_value)
    .bind(tip_hash)
    .bind(lookup_type)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record an unresolved sighting, preserving first-encountered time.
pub async fn record_unknown_sighting(pool: &SqlitePool, tip_hash: &str, lookup_type: LookupType) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO unknown_hashes (tip_hash, lookup_type, first_encountered)
        VALUES (?, ?, ?)
        ON CONFLICT(tip_hash, lookup_type) DO NOTHING
        "#,
    )
    .bind(tip_hash)
    .bind(lookup_type)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_unknown(pool: &SqlitePool) -> Result<Vec<UnknownHash>> {
    let rows = sqlx::query_as::<_, UnknownHash>(
        "SELECT * FROM unknown_hashes WHERE resolved_at IS NULL ORDER BY first_encountered ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_sighting_is_idempotent_on_first_encountered() {
        let pool = tipflow_db::connect("sqlite::memory:", 1).await.unwrap();
        record_unknown_sighting(&pool, "h1", LookupType::Vehicle).await.unwrap();
        let first = list_unknown(&pool).await.unwrap();
        record_unknown_sighting(&pool, "h1", LookupType::Vehicle).await.unwrap();
        let second = list_unknown(&pool).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].first_encountered, second[0].first_encountered);
    }

    #[tokio::test]
    async fn manual_resolution_updates_both_tables() {
        let pool = tipflow_db::connect("sqlite::memory:", 1).await.unwrap();
        record_unknown_sighting(&pool, "h2", LookupType::Trailer).await.unwrap();
        upsert_one(&pool, "h2", LookupType::Trailer, "Trailer-9", Some("manual")).await.unwrap();
        let unresolved = list_unknown(&pool).await.unwrap();
        assert!(unresolved.is_empty());
        let all = load_all(&pool).await.unwrap();
        assert_eq!(all[0].resolved_value, "Trailer-9");
    }
}
