//! A. Store: persistence of work items, the resolved-hash dictionary,
//! attachment records, and processing errors.
//!
//! The pool-wrapping facade and claim-then-reselect transaction shape
//! follow the pattern used elsewhere for ports of Python SQLAlchemy code to
//! Rust `sqlx`; the exact eligible-batch query and status vocabulary are
//! grounded on
//! `original_source/processors/field_processor.py:DatabaseRecordManager`.

mod attachments;
mod error;
mod errors_log;
mod hashes;
mod models;
mod sql_ident;
mod work_items;

pub use error::{Result, StoreError};
pub use models::{AttachmentRow, ExtractedFields, HashEntry, ProcessingErrorRow, UnknownHash, WorkItem};

use sqlx::SqlitePool;
use tipflow_config::KindSchema;
use tipflow_protocol::{LookupType, ProcessingStatus};

/// Thread-safe facade over the connection pool. Cheap to clone (an `Arc`
/// internally via `SqlitePool`), shared across every component above it in
/// the dependency order.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = tipflow_db::connect(database_url, pool_size).await?;
        Ok(Store { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Store { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Add per-kind mapped columns for every configured kind. Call once at
    /// startup after loading config.
    pub async fn ensure_kind_schemas<'a>(
        &self,
        kinds: impl IntoIterator<Item = &'a KindSchema>,
    ) -> Result<()> {
        for kind in kinds {
            work_items::ensure_kind_columns(&self.pool, kind).await?;
        }
        Ok(())
    }

    // ---- work items ----

    pub async fn insert_pending(
        &self,
        tip: &str,
        kind: &str,
        source_filename: Option<&str>,
        expected_inspection_id: Option<&str>,
        expected_inspection_date: Option<&str>,
    ) -> Result<bool> {
        work_items::insert_if_absent(
            &self.pool,
            tip,
            kind,
            source_filename,
            expected_inspection_id,
            expected_inspection_date,
        )
        .await
    }

    pub async fn get_work_item(&self, tip: &str) -> Result<Option<WorkItem>> {
        work_items::get(&self.pool, tip).await
    }

    pub async fn fetch_eligible_batch(&self, kind: &str, limit: i64) -> Result<Vec<WorkItem>> {
        work_items::fetch_eligible_batch(&self.pool, kind, limit).await
    }

    pub async fn claim_for_processing(&self, tip: &str) -> Result<Option<WorkItem>> {
        work_items::claim_for_processing(&self.pool, tip).await
    }

    pub async fn upsert_success_fields(
        &self,
        tip: &str,
        extracted: &ExtractedFields,
        total_attachments: i64,
    ) -> Result<()> {
        work_items::upsert_success_fields(&self.pool, tip, extracted, total_attachments).await
    }

    pub async fn record_not_found(&self, tip: &str) -> Result<()> {
        work_items::record_not_found(&self.pool, tip).await
    }

    pub async fn record_interrupted(&self, tip: &str) -> Result<()> {
        work_items::record_interrupted(&self.pool, tip).await
    }

    pub async fn record_rate_limited(&self, tip: &str) -> Result<()> {
        work_items::record_rate_limited(&self.pool, tip).await
    }

    pub async fn schedule_retry(
        &self,
        tip: &str,
        status_on_retry: ProcessingStatus,
        next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
        permanently_failed: bool,
        last_error: Option<&str>,
    ) -> Result<()> {
        work_items::schedule_retry(
            &self.pool,
            tip,
            status_on_retry,
            next_retry_at,
            permanently_failed,
            last_error,
        )
        .await
    }

    pub async fn finalize_attachment_outcome(
        &self,
        tip: &str,
        final_status: ProcessingStatus,
        completed_attachment_count: i64,
        all_attachments_complete: bool,
    ) -> Result<()> {
        work_items::finalize_attachment_outcome(
            &self.pool,
            tip,
            final_status,
            completed_attachment_count,
            all_attachments_complete,
        )
        .await
    }

    // ---- attachments ----

    pub async fn get_attachment(&self, record_tip: &str, attachment_tip: &str) -> Result<Option<AttachmentRow>> {
        attachments::get(&self.pool, record_tip, attachment_tip).await
    }

    pub async fn begin_download(
        &self,
        record_tip: &str,
        attachment_tip: &str,
        sequence: i64,
        filename: &str,
        file_path: &str,
    ) -> Result<()> {
        attachments::begin_download(&self.pool, record_tip, attachment_tip, sequence, filename, file_path).await
    }

    pub async fn mark_attachment_complete(
        &self,
        record_tip: &str,
        attachment_tip: &str,
        file_size_bytes: i64,
        file_hash_md5: &str,
    ) -> Result<()> {
        attachments::mark_complete(&self.pool, record_tip, attachment_tip, file_size_bytes, file_hash_md5).await
    }

    pub async fn mark_attachment_failed(
        &self,
        record_tip: &str,
        attachment_tip: &str,
        last_error: &str,
    ) -> Result<()> {
        attachments::mark_failed(&self.pool, record_tip, attachment_tip, last_error).await
    }

    pub async fn count_complete_attachments(&self, record_tip: &str) -> Result<i64> {
        attachments::count_complete(&self.pool, record_tip).await
    }

    // ---- hash dictionary ----

    pub async fn load_all_hashes(&self) -> Result<Vec<HashEntry>> {
        hashes::load_all(&self.pool).await
    }

    pub async fn replace_all_hashes(&self, entries: &[(String, LookupType, String, String)]) -> Result<()> {
        hashes::replace_all(&self.pool, entries).await
    }

    pub async fn resolve_hash_manually(
        &self,
        tip_hash: &str,
        lookup_type: LookupType,
        resolved_value: &str,
        source_type: Option<&str>,
    ) -> Result<()> {
        hashes::upsert_one(&self.pool, tip_hash, lookup_type, resolved_value, source_type).await
    }

    pub async fn record_unknown_hash_sighting(&self, tip_hash: &str, lookup_type: LookupType) -> Result<()> {
        hashes::record_unknown_sighting(&self.pool, tip_hash, lookup_type).await
    }

    pub async fn list_unknown_hashes(&self) -> Result<Vec<UnknownHash>> {
        hashes::list_unknown(&self.pool).await
    }

    // ---- processing errors ----

    pub async fn record_processing_error(
        &self,
        tip: &str,
        error_type: &str,
        error_message: &str,
        error_details_json: Option<&str>,
    ) -> Result<()> {
        errors_log::record(&self.pool, tip, error_type, error_message, error_details_json).await
    }
}
