//! Base (kind-independent) schema for the Store.
//!
//! Per-kind mapped columns are added dynamically by `tipflow_store` once a
//! `KindSchema` is known; this crate only owns the columns common to every
//! work item.

pub const CREATE_WORK_ITEMS: &str = r#"
CREATE TABLE IF NOT EXISTS work_items (
    tip                         TEXT PRIMARY KEY,
    kind                        TEXT NOT NULL,
    status                      TEXT NOT NULL,
    retry_count                 INTEGER NOT NULL DEFAULT 0,
    next_retry_at               TEXT,
    last_error                  TEXT,
    last_attempt_at             TEXT,
    permanently_failed          INTEGER NOT NULL DEFAULT 0,
    total_attachments           INTEGER NOT NULL DEFAULT 0,
    completed_attachment_count  INTEGER NOT NULL DEFAULT 0,
    all_attachments_complete    INTEGER NOT NULL DEFAULT 0,
    has_unknown_hashes          INTEGER NOT NULL DEFAULT 0,
    source_filename             TEXT,
    expected_inspection_id      TEXT,
    expected_inspection_date    TEXT,
    inspection_id               TEXT,
    inspection_date             TEXT,
    csv_imported_at             TEXT NOT NULL,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    raw_payload_json            TEXT,
    raw_meta_json               TEXT
)
"#;

pub const CREATE_ATTACHMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS attachments (
    record_tip              TEXT NOT NULL,
    attachment_tip           TEXT NOT NULL,
    sequence                 INTEGER NOT NULL,
    filename                  TEXT NOT NULL,
    file_path                 TEXT NOT NULL,
    status                    TEXT NOT NULL,
    validation_status         TEXT NOT NULL,
    file_size_bytes           INTEGER,
    file_hash_md5             TEXT,
    download_started_at       TEXT,
    download_completed_at     TEXT,
    last_error                TEXT,
    PRIMARY KEY (record_tip, attachment_tip)
)
"#;

pub const CREATE_HASH_LOOKUP: &str = r#"
CREATE TABLE IF NOT EXISTS hash_lookup (
    tip_hash        TEXT NOT NULL,
    lookup_type     TEXT NOT NULL,
    resolved_value  TEXT NOT NULL,
    source_type     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(tip_hash, lookup_type)
)
"#;

pub const CREATE_UNKNOWN_HASHES: &str = r#"
CREATE TABLE IF NOT EXISTS unknown_hashes (
    tip_hash          TEXT NOT NULL,
    lookup_type       TEXT NOT NULL,
    first_encountered TEXT NOT NULL,
    resolved_at       TEXT,
    resolved_value    TEXT,
    UNIQUE(tip_hash, lookup_type)
)
"#;

pub const CREATE_PROCESSING_ERRORS: &str = r#"
CREATE TABLE IF NOT EXISTS processing_errors (
    tip                 TEXT NOT NULL,
    error_type          TEXT NOT NULL,
    error_message       TEXT NOT NULL,
    error_details_json  TEXT,
    created_at          TEXT NOT NULL
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_work_items_kind_status ON work_items(kind, status)",
    "CREATE INDEX IF NOT EXISTS idx_work_items_next_retry ON work_items(next_retry_at)",
    "CREATE INDEX IF NOT EXISTS idx_attachments_record_tip ON attachments(record_tip)",
    "CREATE INDEX IF NOT EXISTS idx_processing_errors_tip ON processing_errors(tip)",
];
