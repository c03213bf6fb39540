//! K. SourcePoller: SFTP and local-directory CSV ingest into the
//! work queue. Ported from `original_source/sftp_download_tips.py`.

mod audit;
mod csv_extract;
mod error;
mod kind_detect;
mod local;
mod ssh;
mod staging;

pub use error::{PollerError, Result};
pub use ssh::SftpPuller;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tipflow_config::{KindSchema, SftpConfig};
use tipflow_store::Store;

use csv_extract::extract_row;
use staging::{archive_filename, quarantine_filename, LocalPaths, SftpPaths};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleSummary {
    pub files_processed: usize,
    pub files_quarantined: usize,
    pub files_empty: usize,
    pub tips_found: usize,
    pub tips_inserted: usize,
    pub tips_duplicate: usize,
}

impl CycleSummary {
    fn merge(&mut self, other: FileOutcome) {
        match other {
            FileOutcome::Processed { tips_found, inserted, duplicates } => {
                self.files_processed += 1;
                if tips_found == 0 {
                    self.files_empty += 1;
                }
                self.tips_found += tips_found;
                self.tips_inserted += inserted;
                self.tips_duplicate += duplicates;
            }
            FileOutcome::Quarantined => self.files_quarantined += 1,
        }
    }
}

enum FileOutcome {
    Processed { tips_found: usize, inserted: usize, duplicates: usize },
    Quarantined,
}

pub struct SourcePoller {
    store: Store,
    kinds: HashMap<String, KindSchema>,
    sftp_config: SftpConfig,
    sftp_paths: SftpPaths,
    local_paths: LocalPaths,
    audit_trail_enabled: bool,
}

impl SourcePoller {
    pub fn new(
        store: Store,
        kinds: HashMap<String, KindSchema>,
        sftp_config: SftpConfig,
        etl_root: impl AsRef<Path>,
        audit_trail_enabled: bool,
    ) -> std::io::Result<Self> {
        let sftp_paths = SftpPaths::under(etl_root.as_ref());
        let local_paths = LocalPaths::under(etl_root.as_ref());
        sftp_paths.ensure_exist()?;
        local_paths.ensure_exist()?;
        Ok(SourcePoller { store, kinds, sftp_config, sftp_paths, local_paths, audit_trail_enabled })
    }

    /// K1. Connects, lists, downloads, ingests, archives/quarantines, and
    /// deletes remote files on success. Remote
    /// deletions are queued and executed once at the end of the cycle.
    pub async fn run_sftp_cycle(&self) -> Result<CycleSummary> {
        if !self.sftp_config.enabled {
            return Ok(CycleSummary::default());
        }

        let mut puller = SftpPuller::connect(&self.sftp_config).await?;
        let remote_files = puller.list_csv_files().await?;

        let mut summary = CycleSummary::default();
        let mut to_delete = Vec::new();

        for remote in remote_files {
            let local_path = match puller.download(&remote.name, &self.sftp_paths.incoming).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(file = %remote.name, error = %e, "failed to download sftp file, skipping");
                    continue;
                }
            };

            match self.ingest_csv_file(&local_path, &self.sftp_paths.processed, &self.sftp_paths.quarantine).await {
                Ok(outcome) => {
                    let processed = matches!(outcome, FileOutcome::Processed { .. });
                    summary.merge(outcome);
                    if processed {
                        to_delete.push(remote.name.clone());
                    }
                }
                Err(e) => {
                    tracing::error!(file = %remote.name, error = %e, "unhandled error ingesting sftp file");
                }
            }
        }

        puller.execute_deletions(&to_delete).await;
        puller.close().await?;
        Ok(summary)
    }

    /// K2. Scans the local pending directory; archives successes, moves failures to the `error` tree
    /// instead of `quarantine`.
    pub async fn run_local_cycle(&self) -> Result<CycleSummary> {
        let files = local::list_pending_csvs(&self.local_paths.pending).map_err(|source| PollerError::Io {
            path: self.local_paths.pending.display().to_string(),
            source,
        })?;

        let mut summary = CycleSummary::default();
        for path in files {
            let outcome = self.ingest_csv_file(&path, &self.local_paths.processed, &self.local_paths.error).await?;
            summary.merge(outcome);
        }
        Ok(summary)
    }

    async fn ingest_csv_file(&self, local_path: &Path, processed_dir: &Path, failure_dir: &Path) -> Result<FileOutcome> {
        let path_str = local_path.display().to_string();

        let mut reader = match csv::Reader::from_path(local_path) {
            Ok(r) => r,
            Err(source) => {
                self.move_to(local_path, failure_dir, &quarantine_filename(local_path))?;
                tracing::error!(file = %path_str, error = %source, "FILE QUARANTINED | reason=cannot open csv");
                return Ok(FileOutcome::Quarantined);
            }
        };

        let header: Vec<String> = match reader.headers() {
            Ok(h) => h.iter().map(str::to_string).collect(),
            Err(source) => {
                self.move_to(local_path, failure_dir, &quarantine_filename(local_path))?;
                tracing::error!(file = %path_str, error = %source, "FILE QUARANTINED | reason=cannot read header row");
                return Ok(FileOutcome::Quarantined);
            }
        };

        let detection = match kind_detect::detect(&header, &self.kinds) {
            Some(d) => d,
            None => {
                self.move_to(local_path, failure_dir, &quarantine_filename(local_path))?;
                tracing::error!(file = %path_str, "FILE QUARANTINED | reason=unrecognised header");
                return Ok(FileOutcome::Quarantined);
            }
        };

        let abbreviation = detection.kind.abbreviation.clone();
        let mut tips_found = 0usize;
        let mut inserted = 0usize;
        let mut duplicates = 0usize;
        let mut extracted = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(source) => {
                    self.move_to(local_path, failure_dir, &quarantine_filename(local_path))?;
                    tracing::error!(file = %path_str, error = %source, "FILE QUARANTINED | reason=malformed row");
                    return Ok(FileOutcome::Quarantined);
                }
            };

            let Some(tip_data) = extract_row(&record, &detection) else {
                continue;
            };
            tips_found += 1;

            let was_inserted = self
                .store
                .insert_pending(
                    &tip_data.tip,
                    &abbreviation,
                    local_path.file_name().and_then(|n| n.to_str()),
                    tip_data.inspection_id.as_deref(),
                    tip_data.inspection_date.as_deref(),
                )
                .await?;

            if was_inserted {
                inserted += 1;
            } else {
                duplicates += 1;
                tracing::warn!(tip = %tip_data.tip, file = %path_str, "duplicate tip, not re-inserted");
            }
            extracted.push(tip_data);
        }

        let source_filename = local_path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown.csv").to_string();
        if self.audit_trail_enabled && !extracted.is_empty() {
            audit::write_audit_csv(&extracted, &abbreviation, processed_dir, &source_filename)?;
        }

        let archive_name = archive_filename(&abbreviation, local_path);
        self.move_to(local_path, processed_dir, &archive_name)?;

        Ok(FileOutcome::Processed { tips_found, inserted, duplicates })
    }

    fn move_to(&self, source: &Path, dest_dir: &Path, dest_name: &str) -> Result<()> {
        std::fs::create_dir_all(dest_dir).map_err(|source_err| PollerError::Io {
            path: dest_dir.display().to_string(),
            source: source_err,
        })?;
        let dest = dest_dir.join(dest_name);
        std::fs::rename(source, &dest).map_err(|source_err| PollerError::Io {
            path: dest.display().to_string(),
            source: source_err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

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

    async fn test_store() -> Store {
        let store = Store::connect("sqlite::memory:", 1).await.unwrap();
        store.ensure_kind_schemas([&lcd_schema()]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn ingests_new_tips_and_skips_duplicates() {
        let store = test_store().await;
        store.insert_pending("existing", "LCD", None, None, None).await.unwrap();

        let dir = tempdir().unwrap();
        let etl_root = dir.path().join("etl");
        let mut kinds = HashMap::new();
        kinds.insert("LCD".to_string(), lcd_schema());
        let poller = SourcePoller::new(store.clone(), kinds, SftpConfig::default(), &etl_root, true).unwrap();

        let local_dir = dir.path().join("local");
        std::fs::create_dir_all(&local_dir).unwrap();
        let csv_path = local_dir.join("drop.csv");
        std::fs::write(&csv_path, "tip,lcdInspectionId,date\nexisting,LCD - 1,2024-01-01\nnewtip,LCD - 2,2024-01-02\n").unwrap();

        let outcome = poller
            .ingest_csv_file(&csv_path, &poller.local_paths.processed, &poller.local_paths.error)
            .await
            .unwrap();

        match outcome {
            FileOutcome::Processed { tips_found, inserted, duplicates } => {
                assert_eq!(tips_found, 2);
                assert_eq!(inserted, 1);
                assert_eq!(duplicates, 1);
            }
            FileOutcome::Quarantined => panic!("expected a processed outcome"),
        }

        assert!(store.get_work_item("newtip").await.unwrap().is_some());
        assert!(!csv_path.exists());
    }

    #[tokio::test]
    async fn quarantines_unrecognised_header() {
        let store = test_store().await;
        let dir = tempdir().unwrap();
        let etl_root = dir.path().join("etl");
        let mut kinds = HashMap::new();
        kinds.insert("LCD".to_string(), lcd_schema());
        let poller = SourcePoller::new(store, kinds, SftpConfig::default(), &etl_root, true).unwrap();

        let local_dir = dir.path().join("local");
        std::fs::create_dir_all(&local_dir).unwrap();
        let csv_path = local_dir.join("bad.csv");
        std::fs::write(&csv_path, "tip,someOtherId\nfoo,bar\n").unwrap();

        let outcome = poller
            .ingest_csv_file(&csv_path, &poller.local_paths.processed, &poller.local_paths.error)
            .await
            .unwrap();

        assert!(matches!(outcome, FileOutcome::Quarantined));
        assert!(!csv_path.exists());
        assert!(poller.local_paths.error.read_dir().unwrap().next().is_some());
    }
}
