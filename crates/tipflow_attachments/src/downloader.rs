//! H. AttachmentDownloader. Ported from
//! `original_source/processors/base_processor.py:AttachmentDownloader,
//! validate_attachment_file, calculate_md5_hash`.

use std::path::Path;
use std::time::Duration;

use md5::{Digest, Md5};
use tipflow_protocol::AttachmentStatus;
use tipflow_store::Store;
use tipflow_upstream::{UpstreamClient, UpstreamError};

use crate::error::{AttachmentError, Result};

pub struct DownloadOutcome {
    pub success: bool,
    pub attempts: u32,
    pub file_size_bytes: u64,
    pub error: Option<String>,
}

pub struct AttachmentDownloader {
    store: Store,
    upstream: UpstreamClient,
    min_file_size: u64,
    attachment_pause: Duration,
}

impl AttachmentDownloader {
    pub fn new(store: Store, upstream: UpstreamClient, min_file_size: u64, attachment_pause: Duration) -> Self {
        Self { store, upstream, min_file_size, attachment_pause }
    }

    pub fn attachment_pause(&self) -> Duration {
        self.attachment_pause
    }

    /// Downloads a single attachment, tracking the row in the Store
    /// throughout. Idempotent: a prior `complete` row whose file still
    /// validates is reported as success without re-downloading. `url` is the
    /// payload-provided attachment URL; its `/media` prefix is stripped
    /// before the remainder is resolved against `media_service_url`.
    pub async fn download(
        &self,
        url: &str,
        filename: &str,
        attachment_tip: &str,
        inspection_folder: &Path,
        record_tip: &str,
        sequence: u32,
    ) -> Result<DownloadOutcome> {
        let output_path = inspection_folder.join(filename);

        if let Some(existing) = self.store.get_attachment(record_tip, attachment_tip).await? {
            if existing.status == AttachmentStatus::Complete && validate_file(&output_path, self.min_file_size).is_ok() {
                return Ok(DownloadOutcome {
                    success: true,
                    attempts: 0,
                    file_size_bytes: existing.file_size_bytes.unwrap_or(0) as u64,
                    error: None,
                });
            }
        }

        let temp_path = output_path.with_extension("tmp");
        self.store
            .begin_download(record_tip, attachment_tip, sequence as i64, filename, &output_path.to_string_lossy())
            .await?;

        let attachment_url = strip_media_prefix(url);
        let fetch = self.upstream.get_attachment(&attachment_url, attachment_tip).await;

        let response = match fetch {
            Ok(response) => response,
            Err(UpstreamError::CircuitOpen) => {
                let msg = "circuit breaker open".to_string();
                self.store.mark_attachment_failed(record_tip, attachment_tip, &msg).await?;
                return Ok(DownloadOutcome { success: false, attempts: 0, file_size_bytes: 0, error: Some(msg) });
            }
            Err(UpstreamError::Transport(e)) => {
                let msg = format!("download exception: {e}");
                self.store.mark_attachment_failed(record_tip, attachment_tip, &msg).await?;
                return Ok(DownloadOutcome { success: false, attempts: 0, file_size_bytes: 0, error: Some(msg) });
            }
            Err(UpstreamError::InvalidUrl(e)) => {
                let msg = format!("download exception: {e}");
                self.store.mark_attachment_failed(record_tip, attachment_tip, &msg).await?;
                return Ok(DownloadOutcome { success: false, attempts: 0, file_size_bytes: 0, error: Some(msg) });
            }
        };

        if response.status != 200 {
            let msg = format!("unexpected status {} downloading attachment", response.status);
            self.store.mark_attachment_failed(record_tip, attachment_tip, &msg).await?;
            return Ok(DownloadOutcome { success: false, attempts: response.attempts, file_size_bytes: 0, error: Some(msg) });
        }

        tokio::fs::write(&temp_path, &response.body_bytes).await?;

        if let Err(validation_error) = validate_file(&temp_path, self.min_file_size) {
            tokio::fs::remove_file(&temp_path).await.ok();
            let msg = format!("validation failed: {validation_error}");
            self.store.mark_attachment_failed(record_tip, attachment_tip, &msg).await?;
            return Ok(DownloadOutcome { success: false, attempts: response.attempts, file_size_bytes: 0, error: Some(msg) });
        }

        tokio::fs::rename(&temp_path, &output_path).await?;

        let file_hash = compute_md5(&output_path).await?;
        let file_size = tokio::fs::metadata(&output_path).await?.len();

        self.store
            .mark_attachment_complete(record_tip, attachment_tip, file_size as i64, &file_hash)
            .await?;

        Ok(DownloadOutcome { success: true, attempts: response.attempts, file_size_bytes: file_size, error: None })
    }
}

fn strip_media_prefix(url: &str) -> String {
    url.strip_prefix("/media").unwrap_or(url).to_string()
}

fn validate_file(path: &Path, min_size: u64) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|_| AttachmentError::Validation("file does not exist".to_string()))?;
    let size = metadata.len();
    if size < min_size {
        return Err(AttachmentError::Validation(format!("file too small ({size} bytes)")));
    }
    let mut buf = [0u8; 10];
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let read = file.read(&mut buf)?;
    if read == 0 {
        return Err(AttachmentError::Validation("file appears empty".to_string()));
    }
    Ok(())
}

async fn compute_md5(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tipflow_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use tipflow_config::UpstreamConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            window_size: 20,
            failure_threshold: 0.5,
            recovery_threshold: 0.3,
            open_duration: Duration::from_secs(60),
        }))
    }

    fn test_upstream(base_url: &str) -> UpstreamClient {
        UpstreamClient::new(
            &UpstreamConfig {
                base_url: base_url.to_string(),
                media_service_url: base_url.to_string(),
                namespace: "ns".to_string(),
                token: "tok".to_string(),
                request_timeout_secs: 5,
                attachment_timeout_secs: 5,
                max_retries: 1,
                backoff_factor: 0.01,
                max_backoff_secs: 0.05,
                too_many_requests_sleep_secs: 1,
            },
            test_breaker(),
        )
        .unwrap()
    }

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn successful_download_marks_complete_and_hashes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 2048]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = test_store().await;
        let downloader = AttachmentDownloader::new(store.clone(), test_upstream(&server.uri()), 1024, Duration::from_millis(0));

        let url = format!("{}/media/file?tip=abc", server.uri());
        let outcome = downloader
            .download(&url, "photo.jpg", "abc", dir.path(), "rec1", 1)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.file_size_bytes, 2048);

        let row = store.get_attachment("rec1", "abc").await.unwrap().unwrap();
        assert_eq!(row.status, AttachmentStatus::Complete);
        assert!(row.file_hash_md5.is_some());
    }

    /// Payload attachment URLs are relative paths in production (e.g.
    /// `/media/file?tip=...`); the `/media` prefix must be stripped and the
    /// remainder resolved against `media_service_url`, not passed as-is.
    #[tokio::test]
    async fn relative_media_url_resolves_against_media_service_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 2048]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = test_store().await;
        let downloader = AttachmentDownloader::new(store.clone(), test_upstream(&server.uri()), 1024, Duration::from_millis(0));

        let outcome = downloader
            .download("/media/file?tip=abc", "photo.jpg", "abc", dir.path(), "rec1", 1)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.file_size_bytes, 2048);
    }

    #[tokio::test]
    async fn undersized_body_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 10]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = test_store().await;
        let downloader = AttachmentDownloader::new(store.clone(), test_upstream(&server.uri()), 1024, Duration::from_millis(0));

        let url = format!("{}/media/file?tip=abc", server.uri());
        let outcome = downloader
            .download(&url, "photo.jpg", "abc", dir.path(), "rec1", 1)
            .await
            .unwrap();

        assert!(!outcome.success);
        let row = store.get_attachment("rec1", "abc").await.unwrap().unwrap();
        assert_eq!(row.status, AttachmentStatus::Failed);
    }

    #[tokio::test]
    async fn server_error_marks_failed_without_writing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/file"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = test_store().await;
        let downloader = AttachmentDownloader::new(store.clone(), test_upstream(&server.uri()), 1024, Duration::from_millis(0));

        let url = format!("{}/media/file?tip=abc", server.uri());
        let outcome = downloader
            .download(&url, "photo.jpg", "abc", dir.path(), "rec1", 1)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(!dir.path().join("photo.jpg").exists());
    }
}
