//! Kind detection from a CSV header row. Ported from
//! `original_source/sftp_download_tips.py:OBJECT_TYPE_SIGNATURES` /
//! `detect_object_type`, generalised to read the id-column registry from the
//! configured kinds instead of a hardcoded table, since `KindSchema` already
//! carries `id_field_upstream` per kind.

use std::collections::HashMap;

use tipflow_config::KindSchema;

/// The kind matched for a CSV file, plus the header positions needed to
/// pull per-row metadata out of the remaining columns.
pub struct Detection<'a> {
    pub kind: &'a KindSchema,
    pub id_column_index: usize,
    pub date_column_index: Option<usize>,
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Matches the header row (case-insensitive, trimmed) against every
/// configured kind's `id_field_upstream`. First match wins.
pub fn detect<'a>(header: &[String], kinds: &'a HashMap<String, KindSchema>) -> Option<Detection<'a>> {
    let normalised: Vec<String> = header.iter().map(|h| normalise(h)).collect();

    for kind in kinds.values() {
        let target = normalise(&kind.id_field_upstream);
        if let Some(id_column_index) = normalised.iter().position(|h| *h == target) {
            let date_target = normalise(&kind.date_field);
            let date_column_index = normalised.iter().position(|h| *h == date_target);
            return Some(Detection { kind, id_column_index, date_column_index });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tipflow_config::KindSchema;

    fn lcd_schema() -> KindSchema {
        KindSchema {
            abbreviation: "LCD".to_string(),
            full_name: "Load Compliance Check Driver/Loader".to_string(),
            endpoint_template: "/inspections/$tip".to_string(),
            id_field_upstream: "lcdInspectionId".to_string(),
            id_field_column: "inspection_id".to_string(),
            date_field: "date".to_string(),
            unknown_placeholder: "Unknown".to_string(),
            report_template: None,
            folder_pattern: "{abbreviation}/{year}/{month}/{date} {inspection_id}".to_string(),
            filename_pattern: "{abbreviation}_{inspection_id}_{date}_{stub}_{sequence}.jpg".to_string(),
            field_mappings: Vec::new(),
            attachment_stub_overrides: HashMap::new(),
        }
    }

    #[test]
    fn matches_case_insensitively_and_trims() {
        let mut kinds = HashMap::new();
        kinds.insert("LCD".to_string(), lcd_schema());

        let header = vec!["tip".to_string(), " LCDINSPECTIONID ".to_string(), "date".to_string()];
        let detection = detect(&header, &kinds).expect("should detect LCD");
        assert_eq!(detection.kind.abbreviation, "LCD");
        assert_eq!(detection.id_column_index, 1);
        assert_eq!(detection.date_column_index, Some(2));
    }

    #[test]
    fn returns_none_for_unknown_header() {
        let mut kinds = HashMap::new();
        kinds.insert("LCD".to_string(), lcd_schema());

        let header = vec!["tip".to_string(), "someOtherId".to_string()];
        assert!(detect(&header, &kinds).is_none());
    }
}
