//! Session journal: one TSV line per processed
//! TIP, appended to a single file per processor session.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Serializes writes to the journal file. Cheap to clone; shares the underlying lock.
#[derive(Clone)]
pub struct SessionJournal {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionJournal { path: path.into(), lock: Arc::new(Mutex::new(())) }
    }

    pub async fn append(&self, tip: &str, inspection_id: &str, completed_attachment_count: usize, filenames: &[String]) -> std::io::Result<()> {
        let joined = if filenames.is_empty() { "NONE".to_string() } else { filenames.join(";") };
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            tip,
            inspection_id,
            completed_attachment_count,
            joined
        );

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_tab_separated_line() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::new(dir.path().join("session.tsv"));

        journal.append("tip1", "INS-1", 2, &["a.jpg".to_string(), "b.jpg".to_string()]).await.unwrap();
        journal.append("tip2", "INS-2", 0, &[]).await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("session.tsv")).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("tip1\tINS-1\t2\ta.jpg;b.jpg"));
        assert!(lines[1].ends_with("tip2\tINS-2\t0\tNONE"));
    }
}
