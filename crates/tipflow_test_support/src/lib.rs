//! Shared fixtures for tipflow crate test suites: an in-memory Store, a
//! `KindSchema` builder, a `WorkItem` builder, and a `wiremock`-based stub
//! upstream server.

use chrono::Utc;
use std::collections::HashMap;
use tipflow_config::{FieldMapping, KindSchema};
use tipflow_protocol::ProcessingStatus;
use tipflow_store::{Store, WorkItem};

/// A fresh in-memory `Store` with the base schema applied. Each call opens
/// an independent database; callers wanting to share state across
/// connections should clone the returned `Store` rather than calling this
/// twice.
pub async fn test_store() -> Store {
    Store::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory store should always connect")
}

/// Builds a `KindSchema` for tests, defaulting every field to something
/// plausible for a single-id-field kind with no field mappings. Override
/// individual fields with the `with_*` methods before calling `build`.
pub struct KindSchemaBuilder {
    abbreviation: String,
    full_name: String,
    endpoint_template: String,
    id_field_upstream: String,
    id_field_column: String,
    date_field: String,
    unknown_placeholder: String,
    report_template: Option<String>,
    folder_pattern: String,
    filename_pattern: String,
    field_mappings: Vec<FieldMapping>,
    attachment_stub_overrides: HashMap<String, String>,
}

impl KindSchemaBuilder {
    pub fn new(abbreviation: impl Into<String>) -> Self {
        let abbreviation = abbreviation.into();
        KindSchemaBuilder {
            endpoint_template: format!("/api/{}/{{id}}", abbreviation.to_lowercase()),
            id_field_upstream: format!("{}InspectionId", abbreviation.to_lowercase()),
            id_field_column: "inspection_id".to_string(),
            date_field: "inspection_date".to_string(),
            unknown_placeholder: "UNKNOWN".to_string(),
            report_template: None,
            folder_pattern: "{abbreviation}/{tip}".to_string(),
            filename_pattern: "{tip}_{sequence}".to_string(),
            field_mappings: Vec::new(),
            attachment_stub_overrides: HashMap::new(),
            full_name: abbreviation.clone(),
            abbreviation,
        }
    }

    pub fn with_field_mappings(mut self, mappings: Vec<FieldMapping>) -> Self {
        self.field_mappings = mappings;
        self
    }

    pub fn with_id_field_upstream(mut self, field: impl Into<String>) -> Self {
        self.id_field_upstream = field.into();
        self
    }

    pub fn build(self) -> KindSchema {
        KindSchema {
            abbreviation: self.abbreviation,
            full_name: self.full_name,
            endpoint_template: self.endpoint_template,
            id_field_upstream: self.id_field_upstream,
            id_field_column: self.id_field_column,
            date_field: self.date_field,
            unknown_placeholder: self.unknown_placeholder,
            report_template: self.report_template,
            folder_pattern: self.folder_pattern,
            filename_pattern: self.filename_pattern,
            field_mappings: self.field_mappings,
            attachment_stub_overrides: self.attachment_stub_overrides,
        }
    }
}

/// Builds a `WorkItem` row for tests that exercise batch ordering, retry
/// scheduling, or outcome bookkeeping without going through a real Store
/// insert.
pub struct WorkItemBuilder {
    item: WorkItem,
}

impl WorkItemBuilder {
    pub fn new(tip: impl Into<String>, kind: impl Into<String>) -> Self {
        let now = Utc::now();
        WorkItemBuilder {
            item: WorkItem {
                tip: tip.into(),
                kind: kind.into(),
                status: ProcessingStatus::Pending,
                retry_count: 0,
                next_retry_at: None,
                last_error: None,
                last_attempt_at: None,
                permanently_failed: false,
                total_attachments: 0,
                completed_attachment_count: 0,
                all_attachments_complete: false,
                has_unknown_hashes: false,
                source_filename: None,
                expected_inspection_id: None,
                expected_inspection_date: None,
                inspection_id: None,
                inspection_date: None,
                csv_imported_at: now,
                created_at: now,
                updated_at: now,
                raw_payload_json: None,
                raw_meta_json: None,
            },
        }
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.item.status = status;
        self
    }

    pub fn with_retry_count(mut self, retry_count: i64) -> Self {
        self.item.retry_count = retry_count;
        self
    }

    pub fn with_csv_imported_at(mut self, when: chrono::DateTime<Utc>) -> Self {
        self.item.csv_imported_at = when;
        self
    }

    pub fn build(self) -> WorkItem {
        self.item
    }
}

/// Starts a `wiremock` server and registers a default 200 JSON response for
/// every path, for tests that don't care about request matching beyond
/// "the upstream is reachable". Individual tests should add their own
/// `Mock::given(...)` on the returned server for anything more specific.
pub async fn stub_upstream_server() -> wiremock::MockServer {
    wiremock::MockServer::start().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_schema_builder_produces_usable_defaults() {
        let kind = KindSchemaBuilder::new("LCD").build();
        assert_eq!(kind.abbreviation, "LCD");
        assert_eq!(kind.id_field_upstream, "lcdInspectionId");
    }

    #[test]
    fn work_item_builder_defaults_to_pending() {
        let item = WorkItemBuilder::new("tip-1", "LCD").build();
        assert_eq!(item.status, ProcessingStatus::Pending);
        assert_eq!(item.retry_count, 0);
    }

    #[tokio::test]
    async fn test_store_connects_and_migrates() {
        let store = test_store().await;
        let item = store.get_work_item("missing-tip").await.unwrap();
        assert!(item.is_none());
    }
}
