//! Fallback renderer used when a kind has no configured template.
//! Ported from `original_source/processors/report_generator.py:DefaultReportGenerator`.

use serde_json::Value;
use tipflow_config::KindSchema;
use tipflow_hash::HashResolver;
use tipflow_protocol::ValueType;

use crate::error::Result;

pub async fn render(
    kind: &KindSchema,
    payload: &Value,
    tip: &str,
    inspection_id: &str,
    attachment_count: usize,
    date_format: &str,
    hash_resolver: &HashResolver,
) -> Result<String> {
    let mut lines = Vec::new();
    lines.push("=".repeat(60));
    lines.push(kind.full_name.to_uppercase());
    lines.push(format!("RECORD GENERATED: {}", chrono::Local::now().format("%d-%m-%Y")));
    lines.push("=".repeat(60));
    lines.push(String::new());

    for fm in &kind.field_mappings {
        let Some(value) = payload.get(&fm.upstream_field) else { continue };
        if value.is_null() {
            continue;
        }
        let display_name = format_field_name(&fm.upstream_field);

        let rendered = match fm.value_type {
            ValueType::Hash => {
                let Some(hash_type) = fm.hash_type else { continue };
                let Some(raw) = value.as_str() else { continue };
                hash_resolver.lookup(hash_type, raw, tip, inspection_id).await?
            }
            ValueType::Bool => if value.as_bool().unwrap_or(false) { "Yes" } else { "No" }.to_string(),
            ValueType::Datetime => format_date(value, date_format),
            _ => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };
        lines.push(format!("{display_name}: {rendered}"));
    }

    lines.push(String::new());
    lines.push(format!("Attachments: {attachment_count}"));
    lines.push(String::new());
    lines.push("-".repeat(60));
    lines.push("COMPLETE TECHNICAL DATA (JSON FORMAT)".to_string());
    lines.push("-".repeat(60));
    lines.push(String::new());
    lines.push(serde_json::to_string_pretty(payload).unwrap_or_default());

    Ok(lines.join("\n"))
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

/// camelCase -> Title Case With Spaces, keeping runs of capitals together
/// (e.g. "inspectionID" -> "Inspection ID", matching the original's regex
/// pair rather than splitting every capital).
fn format_field_name(field_name: &str) -> String {
    let mut spaced = String::new();
    let chars: Vec<char> = field_name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev_upper = chars[i - 1].is_uppercase();
            let next_lower = chars.get(i + 1).map(|c| c.is_lowercase()).unwrap_or(false);
            if !prev_upper || next_lower {
                spaced.push(' ');
            }
        }
        spaced.push(c);
    }
    spaced
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_field_name_splits_camel_case() {
        assert_eq!(format_field_name("driverCount"), "Driver Count");
        assert_eq!(format_field_name("vehicle"), "Vehicle");
    }
}
