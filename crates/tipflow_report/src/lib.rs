//! Report rendering (component F). Chooses between the template engine and
//! the fallback generator depending on whether a kind has a configured
//! template, mirroring `original_source/processors/report_generator.py`'s
//! `create_report_generator` factory.

mod context;
mod engine;
mod error;
mod fallback;

pub use error::{ReportError, Result};

use serde_json::Value;
use tipflow_config::KindSchema;
use tipflow_hash::HashResolver;

#[derive(Clone)]
pub struct ReportRenderer {
    hash_resolver: HashResolver,
    date_format: String,
}

impl ReportRenderer {
    pub fn new(hash_resolver: HashResolver, date_format: String) -> Self {
        Self { hash_resolver, date_format }
    }

    pub async fn render(
        &self,
        kind: &KindSchema,
        payload: &Value,
        tip: &str,
        inspection_id: &str,
        attachment_count: usize,
    ) -> Result<String> {
        match &kind.report_template {
            Some(template) => {
                let context = context::build(
                    kind,
                    payload,
                    tip,
                    inspection_id,
                    attachment_count,
                    &self.date_format,
                    &self.hash_resolver,
                )
                .await?;
                Ok(engine::render(template, &context, &kind.unknown_placeholder))
            }
            None => {
                fallback::render(
                    kind,
                    payload,
                    tip,
                    inspection_id,
                    attachment_count,
                    &self.date_format,
                    &self.hash_resolver,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tipflow_config::FieldMapping;
    use tipflow_protocol::{LookupType, ValueType};
    use tipflow_store::Store;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:", 1).await.expect("connect")
    }

    fn test_kind(report_template: Option<String>) -> KindSchema {
        KindSchema {
            abbreviation: "FSV".to_string(),
            full_name: "Fire Safety Visit".to_string(),
            endpoint_template: "/api/tips/{tip}".to_string(),
            id_field_upstream: "id".to_string(),
            id_field_column: "inspection_id".to_string(),
            date_field: "date".to_string(),
            unknown_placeholder: "Unknown".to_string(),
            report_template,
            folder_pattern: "<full_name>".to_string(),
            filename_pattern: "<abbreviation>_<inspection_id>".to_string(),
            field_mappings: vec![FieldMapping {
                upstream_field: "vehicleHash".to_string(),
                store_column: "vehicle".to_string(),
                value_type: ValueType::Hash,
                hash_type: Some(LookupType::Vehicle),
            }],
            attachment_stub_overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn renders_with_template_when_present() {
        let store = test_store().await;
        let resolver = HashResolver::new(store, std::env::temp_dir().join("unknown_hashes_test.log"));
        let renderer = ReportRenderer::new(resolver, "%Y-%m-%d".to_string());
        let kind = test_kind(Some("Vehicle: <vehicleHash_resolved>".to_string()));
        let payload = serde_json::json!({"vehicleHash": "abc123"});

        let report = renderer.render(&kind, &payload, "TIP1", "INS1", 0).await.unwrap();
        assert!(report.starts_with("Vehicle: Unknown (abc123)"));
    }

    #[tokio::test]
    async fn falls_back_when_no_template_configured() {
        let store = test_store().await;
        let resolver = HashResolver::new(store, std::env::temp_dir().join("unknown_hashes_test2.log"));
        let renderer = ReportRenderer::new(resolver, "%Y-%m-%d".to_string());
        let kind = test_kind(None);
        let payload = serde_json::json!({"vehicleHash": "abc123"});

        let report = renderer.render(&kind, &payload, "TIP1", "INS1", 2).await.unwrap();
        assert!(report.contains("FIRE SAFETY VISIT"));
        assert!(report.contains("Attachments: 2"));
    }
}
