//! Template context construction. Ported from
//! `original_source/processors/report_generator.py:ReportGenerator._build_context`.

use std::collections::{HashMap, HashSet};

use chrono::Local;
use serde_json::Value;
use tipflow_config::KindSchema;
use tipflow_hash::HashResolver;
use tipflow_protocol::ValueType;

use crate::error::Result;

pub async fn build(
    kind: &KindSchema,
    payload: &Value,
    tip: &str,
    inspection_id: &str,
    attachment_count: usize,
    date_format: &str,
    hash_resolver: &HashResolver,
) -> Result<HashMap<String, Value>> {
    let mut context = HashMap::new();
    context.insert("generation_date".to_string(), Value::String(Local::now().format("%d-%m-%Y").to_string()));
    context.insert("full_name".to_string(), Value::String(kind.full_name.to_uppercase()));
    context.insert("abbreviation".to_string(), Value::String(kind.abbreviation.clone()));
    context.insert("attachment_count".to_string(), Value::Number(attachment_count.into()));
    context.insert(
        "json_payload".to_string(),
        Value::String(serde_json::to_string_pretty(payload).unwrap_or_default()),
    );

    let mut date_fields: HashSet<&str> = HashSet::from(["date"]);
    for fm in &kind.field_mappings {
        if fm.value_type == ValueType::Datetime {
            date_fields.insert(fm.upstream_field.as_str());
        }
    }

    if let Value::Object(map) = payload {
        for (key, value) in map {
            if key == "$meta" {
                continue;
            }
            if date_fields.contains(key.as_str()) && !value.is_null() {
                context.insert(key.clone(), Value::String(format_date(value, date_format)));
            } else if value.is_null() {
                context.insert(key.clone(), Value::Null);
            } else {
                context.insert(key.clone(), value.clone());
            }
        }
    }

    for fm in &kind.field_mappings {
        if fm.value_type != ValueType::Hash {
            continue;
        }
        let Some(hash_type) = fm.hash_type else { continue };
        let Some(raw) = payload.get(&fm.upstream_field).and_then(Value::as_str) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let resolved = hash_resolver.lookup(hash_type, raw, tip, inspection_id).await?;
        context.insert(format!("{}_resolved", fm.upstream_field), Value::String(resolved.clone()));
        let base_name = fm.upstream_field.replace("_hash", "").replace("Hash", "");
        context.insert(format!("{base_name}_resolved"), Value::String(resolved));
    }

    Ok(context)
}

fn format_date(value: &Value, date_format: &str) -> String {
    let Some(raw) = value.as_str() else {
        return value.to_string();
    };
    let normalized = raw.replace('Z', "+00:00");
    match chrono::DateTime::parse_from_rfc3339(&normalized) {
        Ok(dt) => dt.format(date_format).to_string(),
        Err(_) => raw.to_string(),
    }
}
