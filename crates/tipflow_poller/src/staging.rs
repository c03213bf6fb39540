//! Staging directory layout and archive/quarantine naming.
//! Ported from `original_source/sftp_download_tips.py:archive_file,
//! quarantine_file`.

use std::path::{Path, PathBuf};

use chrono::Utc;

pub struct SftpPaths {
    pub incoming: PathBuf,
    pub processed: PathBuf,
    pub quarantine: PathBuf,
}

impl SftpPaths {
    pub fn under(etl_root: &Path) -> Self {
        let base = etl_root.join("sftp");
        SftpPaths {
            incoming: base.join("incoming"),
            processed: base.join("processed"),
            quarantine: base.join("quarantine"),
        }
    }

    pub fn ensure_exist(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.incoming)?;
        std::fs::create_dir_all(&self.processed)?;
        std::fs::create_dir_all(&self.quarantine)
    }
}

pub struct LocalPaths {
    pub pending: PathBuf,
    pub processed: PathBuf,
    pub error: PathBuf,
}

impl LocalPaths {
    pub fn under(etl_root: &Path) -> Self {
        let base = etl_root.join("local");
        LocalPaths {
            pending: base.join("pending"),
            processed: base.join("processed"),
            error: base.join("error"),
        }
    }

    pub fn ensure_exist(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.pending)?;
        std::fs::create_dir_all(&self.processed)?;
        std::fs::create_dir_all(&self.error)
    }
}

/// The UUID portion of a dropped file is often prefixed `exported-file-` by
/// the upstream export tool; strip it so archive names stay readable.
fn original_stem(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    stem.strip_prefix("exported-file-").unwrap_or(stem).to_string()
}

/// `<abbrev>_<YYYY-MM-DD>_<HHMMSS>_<original-stem>.csv`.
pub fn archive_filename(abbreviation: &str, source_path: &Path) -> String {
    let now = Utc::now();
    format!(
        "{}_{}_{}_{}.csv",
        abbreviation,
        now.format("%Y-%m-%d"),
        now.format("%H%M%S"),
        original_stem(source_path)
    )
}

pub fn quarantine_filename(source_path: &Path) -> String {
    let now = Utc::now();
    let original_name = source_path.file_name().and_then(|s| s.to_str()).unwrap_or("file.csv");
    format!("QUARANTINE_{}_{}_{}", now.format("%Y-%m-%d"), now.format("%H%M%S"), original_name)
}
