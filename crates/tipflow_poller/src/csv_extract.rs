//! Row extraction and date parsing for ingest CSVs. Ported
//! from `original_source/sftp_download_tips.py:extract_tips_from_csv,parse_date`.

use chrono::NaiveDate;

use crate::kind_detect::Detection;

/// Date formats accepted in CSV metadata columns, tried in this
/// order; the first format that parses wins.
const DATE_FORMATS: &[&str] = &[
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d/%m/%Y",
    "%d/%m/%y",
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d-%m-%y",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[derive(Debug, Clone)]
pub struct ExtractedTip {
    pub tip: String,
    pub inspection_id: Option<String>,
    pub inspection_date: Option<String>,
}

/// Extracts one row. The first column is always the TIP.
/// Returns `None` for blank TIP cells, which the Python original skips with
/// a warning rather than treating as fatal.
pub fn extract_row(record: &csv::StringRecord, detection: &Detection) -> Option<ExtractedTip> {
    let tip = record.get(0)?.trim();
    if tip.is_empty() {
        return None;
    }

    let inspection_id = record
        .get(detection.id_column_index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let inspection_date = detection
        .date_column_index
        .and_then(|i| record.get(i))
        .and_then(parse_date)
        .map(|d| d.format("%Y-%m-%d").to_string());

    Some(ExtractedTip { tip: tip.to_string(), inspection_id, inspection_date })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_accepted_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(parse_date("07-Mar-24"), Some(expected));
        assert_eq!(parse_date("07-Mar-2024"), Some(expected));
        assert_eq!(parse_date("07/03/2024"), Some(expected));
        assert_eq!(parse_date("07/03/24"), Some(expected));
        assert_eq!(parse_date("2024-03-07"), Some(expected));
        assert_eq!(parse_date("07-03-2024"), Some(expected));
        assert_eq!(parse_date("07-03-24"), Some(expected));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
    }
}
