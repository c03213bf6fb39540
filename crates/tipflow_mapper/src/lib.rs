//! E. FieldMapper. Ported from
//! `original_source/processors/field_processor.py:FieldProcessor`.

mod error;
mod values;

pub use error::{MapperError, Result};

use serde_json::Value;
use tipflow_config::KindSchema;
use tipflow_hash::HashResolver;
use tipflow_protocol::ValueType;
use tipflow_store::ExtractedFields;

/// Dispatches typed field extraction for one kind's schema, resolving hash
/// fields through the shared [`HashResolver`].
#[derive(Clone)]
pub struct FieldMapper {
    hash_resolver: HashResolver,
}

impl FieldMapper {
    pub fn new(hash_resolver: HashResolver) -> Self {
        FieldMapper { hash_resolver }
    }

    /// Extract every mapped field plus the core identity columns from one
    /// upstream JSON payload.
    pub async fn extract(&self, kind: &KindSchema, payload: &Value, tip: &str) -> Result<ExtractedFields> {
        let inspection_id = payload
            .get(&kind.id_field_upstream)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(kind.unknown_placeholder.clone()));

        let inspection_date = payload
            .get(&kind.date_field)
            .and_then(Value::as_str)
            .and_then(|raw| {
                let normalized = raw.replace('Z', "+00:00");
                chrono::DateTime::parse_from_rfc3339(&normalized).ok()
            })
            .map(|dt| dt.to_rfc3339());

        let mut mapped = Vec::with_capacity(kind.field_mappings.len());
        let mut has_unknown_hashes = false;

        for fm in &kind.field_mappings {
            let raw_value = payload.get(&fm.upstream_field).unwrap_or(&Value::Null);

            let coerced = if fm.value_type == ValueType::Hash {
                let hash_type = fm.hash_type.ok_or_else(|| {
                    MapperError::InvalidPayload(format!("field {} declared hash with no hash_type", fm.upstream_field))
                })?;
                match raw_value.as_str() {
                    Some(hash_value) if !hash_value.is_empty() => {
                        let resolved = self
                            .hash_resolver
                            .lookup(hash_type, hash_value, tip, inspection_id.as_deref().unwrap_or("unknown"))
                            .await?;
                        if resolved.starts_with("Unknown (") {
                            has_unknown_hashes = true;
                        }
                        Some(resolved)
                    }
                    _ => None,
                }
            } else {
                values::coerce(fm.value_type, raw_value)
            };

            mapped.push((fm.store_column.clone(), coerced));
        }

        let raw_payload_json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        let raw_meta_json = payload.get("$meta").map(|meta| meta.to_string());

        Ok(ExtractedFields {
            inspection_id,
            inspection_date,
            has_unknown_hashes,
            mapped,
            raw_payload_json,
            raw_meta_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tipflow_config::FieldMapping;
    use tipflow_protocol::LookupType;
    use tipflow_store::Store;

    fn test_kind() -> KindSchema {
        KindSchema {
            abbreviation: "LCD".to_string(),
            full_name: "Load Compliance Check".to_string(),
            endpoint_template: "/lcd/{tip}".to_string(),
            id_field_upstream: "lcdInspectionId".to_string(),
            id_field_column: "inspection_id".to_string(),
            date_field: "date".to_string(),
            unknown_placeholder: "Unknown".to_string(),
            report_template: None,
            folder_pattern: "{abbreviation}/{inspection_id}".to_string(),
            filename_pattern: "{stub}_{sequence}.jpg".to_string(),
            field_mappings: vec![
                FieldMapping {
                    upstream_field: "vehicle".to_string(),
                    store_column: "vehicle_name".to_string(),
                    value_type: ValueType::Hash,
                    hash_type: Some(LookupType::Vehicle),
                },
                FieldMapping {
                    upstream_field: "driverCount".to_string(),
                    store_column: "driver_count".to_string(),
                    value_type: ValueType::Int,
                    hash_type: None,
                },
            ],
            attachment_stub_overrides: Default::default(),
        }
    }

    #[tokio::test]
    async fn extract_resolves_hash_and_coerces_int() {
        let store = Store::connect("sqlite::memory:", 1).await.unwrap();
        store
            .replace_all_hashes(&[("VH1".to_string(), LookupType::Vehicle, "Truck-7".to_string(), "manual".to_string())])
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let resolver = HashResolver::new(store, dir.path().join("unknown.log"));
        let mapper = FieldMapper::new(resolver);

        let payload = json!({
            "lcdInspectionId": "LCD - 000123",
            "date": "2025-06-15T00:00:00Z",
            "vehicle": "VH1",
            "driverCount": 2,
        });

        let extracted = mapper.extract(&test_kind(), &payload, "aa00").await.unwrap();
        assert_eq!(extracted.inspection_id.as_deref(), Some("LCD - 000123"));
        assert!(!extracted.has_unknown_hashes);
        assert_eq!(extracted.mapped[0], ("vehicle_name".to_string(), Some("Truck-7".to_string())));
        assert_eq!(extracted.mapped[1], ("driver_count".to_string(), Some("2".to_string())));
    }

    #[tokio::test]
    async fn extract_flags_unknown_hash() {
        let store = Store::connect("sqlite::memory:", 1).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let resolver = HashResolver::new(store, dir.path().join("unknown.log"));
        let mapper = FieldMapper::new(resolver);

        let payload = json!({"lcdInspectionId": "LCD - 1", "date": "2025-06-15T00:00:00Z", "vehicle": "VHX", "driverCount": 1});
        let extracted = mapper.extract(&test_kind(), &payload, "bb00").await.unwrap();
        assert!(extracted.has_unknown_hashes);
        assert_eq!(extracted.mapped[0].1, Some("Unknown (VHX)".to_string()));
    }
}
