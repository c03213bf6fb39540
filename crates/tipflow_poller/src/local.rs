//! K2. Local-directory puller: same
//! as the SFTP subflow minus the remote leg.

use std::path::Path;

pub fn list_pending_csvs(pending_dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    if !pending_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = std::fs::read_dir(pending_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false))
        .collect();
    files.sort_by_key(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok());
    Ok(files)
}
