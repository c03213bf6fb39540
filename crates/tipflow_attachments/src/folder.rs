//! I. FolderManager. Ported from
//! `original_source/processors/base_processor.py:FolderManager,sanitise_filename`.

use std::path::PathBuf;

use chrono::DateTime;

pub struct FolderManager {
    base_path: PathBuf,
    abbreviation: String,
    folder_pattern: String,
    filename_pattern: String,
}

impl FolderManager {
    pub fn new(base_path: impl Into<PathBuf>, abbreviation: String, folder_pattern: String, filename_pattern: String) -> Self {
        Self { base_path: base_path.into(), abbreviation, folder_pattern, filename_pattern }
    }

    /// Compute (and create) the folder an inspection's report and
    /// attachments live in.
    pub fn create_inspection_folder(&self, date_str: Option<&str>, inspection_id: &str) -> std::io::Result<PathBuf> {
        let sanitised_id = sanitise_filename(inspection_id);
        let (year, month, date_formatted) = split_date(date_str, "%Y", "%m", "%Y-%m-%d");

        let folder_name = apply_pattern(
            &self.folder_pattern,
            &[
                ("abbreviation", self.abbreviation.as_str()),
                ("year", year.as_str()),
                ("month", month.as_str()),
                ("date", date_formatted.as_str()),
                ("inspection_id", sanitised_id.as_str()),
            ],
        );

        let folder = self.base_path.join(folder_name);
        std::fs::create_dir_all(&folder)?;
        Ok(folder)
    }

    pub fn construct_attachment_filename(&self, inspection_id: &str, date_str: Option<&str>, stub: &str, sequence: u32) -> String {
        let sanitised_id = sanitise_filename(inspection_id);
        let (_, _, date_formatted) = split_date(date_str, "%Y", "%m", "%Y%m%d");
        let sequence_str = format!("{sequence:03}");

        apply_pattern(
            &self.filename_pattern,
            &[
                ("abbreviation", self.abbreviation.as_str()),
                ("inspection_id", sanitised_id.as_str()),
                ("date", date_formatted.as_str()),
                ("stub", stub),
                ("sequence", sequence_str.as_str()),
            ],
        )
    }
}

fn split_date(date_str: Option<&str>, year_fmt: &str, month_fmt: &str, date_fmt: &str) -> (String, String, String) {
    let Some(raw) = date_str.filter(|s| !s.is_empty()) else {
        return ("unknown_year".to_string(), "unknown_month".to_string(), "unknown_date".to_string());
    };
    let normalized = raw.replace('Z', "+00:00");
    match DateTime::parse_from_rfc3339(&normalized) {
        Ok(dt) => (
            dt.format(year_fmt).to_string(),
            dt.format(month_fmt).to_string(),
            dt.format(date_fmt).to_string(),
        ),
        Err(_) => ("unknown_year".to_string(), "unknown_month".to_string(), "unknown_date".to_string()),
    }
}

/// Substitutes `{name}`-style placeholders (the kind config's pattern
/// syntax, distinct from the `<name>` report-template syntax).
fn apply_pattern(pattern: &str, values: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();
    for (key, value) in values {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

/// Replace illegal filename characters with `_`, collapse whitespace runs
/// (including tabs/newlines) to a single space, strip leading/trailing
/// spaces and underscores, truncate to 100 chars. Spaces inside an id like
/// `TA - 00014` are preserved.
pub fn sanitise_filename(text: &str) -> String {
    if text.is_empty() {
        return "unknown".to_string();
    }

    let illegal_replaced: String = text
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            '\t' | '\r' | '\n' => ' ',
            _ => c,
        })
        .collect();

    let collapsed = collapse_spaces(&illegal_replaced);
    let trimmed = collapsed.trim_matches(|c| c == '_' || c == ' ');

    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_filename_preserves_internal_spaces() {
        assert_eq!(sanitise_filename("TA - 00014"), "TA - 00014");
    }

    #[test]
    fn sanitise_filename_replaces_illegal_characters() {
        assert_eq!(sanitise_filename("a/b:c*d"), "a_b_c_d");
    }

    #[test]
    fn sanitise_filename_collapses_whitespace() {
        assert_eq!(sanitise_filename("a\t\tb\n\nc"), "a b c");
    }

    #[test]
    fn sanitise_filename_empty_input_is_unknown() {
        assert_eq!(sanitise_filename(""), "unknown");
    }

    #[test]
    fn folder_pattern_falls_back_to_unknown_on_bad_date() {
        let mgr = FolderManager::new(
            "/tmp/tipflow-test-out",
            "FSV".to_string(),
            "{abbreviation}/{year}/{month}/{date} {inspection_id}".to_string(),
            "{abbreviation}_{inspection_id}_{date}_{stub}_{sequence}.jpg".to_string(),
        );
        let folder = mgr.create_inspection_folder(None, "INS1").unwrap();
        assert!(folder.to_string_lossy().contains("unknown_year/unknown_month/unknown_date INS1"));
        std::fs::remove_dir_all("/tmp/tipflow-test-out").ok();
    }

    #[test]
    fn attachment_filename_pads_sequence() {
        let mgr = FolderManager::new(
            "/tmp",
            "FSV".to_string(),
            "{abbreviation}".to_string(),
            "{abbreviation}_{inspection_id}_{date}_{stub}_{sequence}.jpg".to_string(),
        );
        let name = mgr.construct_attachment_filename("INS1", None, "photo", 2);
        assert_eq!(name, "FSV_INS1_unknown_photo_002.jpg");
    }
}
