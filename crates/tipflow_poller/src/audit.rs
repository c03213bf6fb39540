//! Audit trail for ingested TIPs, ported from `original_source/sftp_download_tips.py:write_audit_csv`.
//! Written alongside the archived source file when `paths.audit_trail_enabled`.

use std::path::Path;

use chrono::Utc;

use crate::csv_extract::ExtractedTip;
use crate::error::{PollerError, Result};

pub fn write_audit_csv(
    tips: &[ExtractedTip],
    abbreviation: &str,
    processed_dir: &Path,
    source_filename: &str,
) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(processed_dir)
        .map_err(|source| PollerError::Io { path: processed_dir.display().to_string(), source })?;

    let now = Utc::now();
    let stem = Path::new(source_filename).file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let audit_filename = format!("tips_{}_{}_{}.csv", now.format("%Y-%m-%d"), now.format("%H%M%S"), stem);
    let audit_path = processed_dir.join(audit_filename);

    let mut writer = csv::Writer::from_path(&audit_path).map_err(|source| PollerError::Csv {
        path: audit_path.display().to_string(),
        source,
    })?;
    writer
        .write_record(["tip", "object_type", "inspection_id", "date", "source_file"])
        .map_err(|source| PollerError::Csv { path: audit_path.display().to_string(), source })?;

    for tip in tips {
        writer
            .write_record([
                tip.tip.as_str(),
                abbreviation,
                tip.inspection_id.as_deref().unwrap_or(""),
                tip.inspection_date.as_deref().unwrap_or(""),
                source_filename,
            ])
            .map_err(|source| PollerError::Csv { path: audit_path.display().to_string(), source })?;
    }
    writer.flush().map_err(|source| PollerError::Io { path: audit_path.display().to_string(), source })?;

    Ok(audit_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let tips = vec![
            ExtractedTip { tip: "aa".to_string(), inspection_id: Some("LCD - 1".to_string()), inspection_date: Some("2024-01-01".to_string()) },
            ExtractedTip { tip: "bb".to_string(), inspection_id: None, inspection_date: None },
        ];

        let path = write_audit_csv(&tips, "LCD", dir.path(), "drop.csv").unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("tip,object_type,inspection_id,date,source_file"));
        assert_eq!(lines.next(), Some("aa,LCD,LCD - 1,2024-01-01,drop.csv"));
        assert_eq!(lines.next(), Some("bb,LCD,,,drop.csv"));
    }
}
