//! Row models for the Store, ported from the original SQLAlchemy-flavoured
//! Python tables: one `FromRow` struct per table, enums decoded straight
//! from their `TEXT` columns.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tipflow_protocol::{AttachmentStatus, LookupType, ProcessingStatus, ValidationStatus};

#[derive(Debug, Clone, FromRow)]
pub struct WorkItem {
    pub tip: String,
    pub kind: String,
    pub status: ProcessingStatus,
    pub retry_count: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub permanently_failed: bool,
    pub total_attachments: i64,
    pub completed_attachment_count: i64,
    pub all_attachments_complete: bool,
    pub has_unknown_hashes: bool,
    pub source_filename: Option<String>,
    pub expected_inspection_id: Option<String>,
    pub expected_inspection_date: Option<String>,
    pub inspection_id: Option<String>,
    pub inspection_date: Option<String>,
    pub csv_imported_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub raw_payload_json: Option<String>,
    pub raw_meta_json: Option<String>,
}

impl WorkItem {
    /// Batch ordering key: priority first, then import age.
    pub fn ordering_key(&self) -> (u8, DateTime<Utc>) {
        (self.status.batch_priority(), self.csv_imported_at)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub record_tip: String,
    pub attachment_tip: String,
    pub sequence: i64,
    pub filename: String,
    pub file_path: String,
    pub status: AttachmentStatus,
    pub validation_status: ValidationStatus,
    pub file_size_bytes: Option<i64>,
    pub file_hash_md5: Option<String>,
    pub download_started_at: Option<DateTime<Utc>>,
    pub download_completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct HashEntry {
    pub tip_hash: String,
    pub lookup_type: LookupType,
    pub resolved_value: String,
    pub source_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UnknownHash {
    pub tip_hash: String,
    pub lookup_type: LookupType,
    pub first_encountered: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_value: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProcessingErrorRow {
    pub tip: String,
    pub error_type: String,
    pub error_message: String,
    pub error_details_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields produced by `FieldMapper::extract` for one fetched payload,
/// ready to upsert into `work_items`.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub inspection_id: Option<String>,
    pub inspection_date: Option<String>,
    pub has_unknown_hashes: bool,
    /// store_column -> stringified value, one entry per kind `FieldMapping`.
    pub mapped: Vec<(String, Option<String>)>,
    pub raw_payload_json: String,
    pub raw_meta_json: Option<String>,
}
