//! J. TipProcessor: orchestrates D(UpstreamClient) -> E(FieldMapper) ->
//! G/H(AttachmentExtractor/Downloader) -> F(ReportRenderer) -> A(Store) for
//! one TIP, owning the status machine and retry scheduling.
//! Ported from `original_source/processors/object_processor.py` and
//! `original_source/processors/base_processor.py`.

pub mod cancel;
mod error;
mod journal;
mod retry;

pub use cancel::CancellationToken;
pub use error::{ProcessorError, Result};
pub use journal::SessionJournal;
pub use retry::RetryScheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tipflow_attachments::{AttachmentDownloader, AttachmentExtractor, FolderManager};
use tipflow_breaker::CircuitBreaker;
use tipflow_config::KindSchema;
use tipflow_mapper::FieldMapper;
use tipflow_protocol::{Outcome, ProcessingStatus};
use tipflow_report::ReportRenderer;
use tipflow_store::Store;
use tipflow_upstream::{classify_status, ClassifiedError, UpstreamClient, UpstreamError};

pub struct TipProcessor {
    store: Store,
    breaker: Arc<CircuitBreaker>,
    upstream: UpstreamClient,
    mapper: FieldMapper,
    renderer: ReportRenderer,
    downloader: AttachmentDownloader,
    retry: RetryScheduler,
    journal: SessionJournal,
    output_root: PathBuf,
    too_many_requests_sleep: Duration,
    attachment_pause: Duration,
    cancellation: CancellationToken,
}

impl TipProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        breaker: Arc<CircuitBreaker>,
        upstream: UpstreamClient,
        mapper: FieldMapper,
        renderer: ReportRenderer,
        downloader: AttachmentDownloader,
        retry: RetryScheduler,
        journal: SessionJournal,
        output_root: impl Into<PathBuf>,
        too_many_requests_sleep: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        let attachment_pause = downloader.attachment_pause();
        TipProcessor {
            store,
            breaker,
            upstream,
            mapper,
            renderer,
            downloader,
            retry,
            journal,
            output_root: output_root.into(),
            too_many_requests_sleep,
            attachment_pause,
            cancellation,
        }
    }

    /// `Process(tip) -> Outcome`. Never propagates an
    /// error past this boundary; every outcome lands in the WorkItem row.
    pub async fn process(&self, tip: &str, kind: &KindSchema) -> Outcome {
        match self.process_inner(tip, kind).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tip, error = %e, "unhandled error processing tip, marking api_error");
                if let Err(store_err) = self.schedule_or_fail(tip, &e.to_string()).await {
                    warn!(tip, error = %store_err, "failed to record processing error");
                }
                Outcome::TransientFail
            }
        }
    }

    async fn process_inner(&self, tip: &str, kind: &KindSchema) -> Result<Outcome> {
        // Step 1: circuit breaker.
        if self.breaker.before_request().is_err() {
            info!(tip, "circuit breaker open, skipping this cycle");
            return Ok(Outcome::TransientFail);
        }

        // Step 2: mark api_retrying, record last_attempt_at (atomic claim;
        // a `None` here means another caller already claimed this tip).
        if self.store.claim_for_processing(tip).await?.is_none() {
            return Ok(Outcome::TransientFail);
        }

        // Step 3: call upstream with $tip substituted.
        let url = kind.endpoint_template.replace("$tip", tip);
        let response = self.upstream.get_json(&url, tip).await;

        let response = match response {
            Ok(r) => r,
            Err(UpstreamError::CircuitOpen) => return Ok(Outcome::TransientFail),
            Err(UpstreamError::Transport(e)) => {
                self.breaker.record_failure();
                return Ok(self.on_api_failure(tip, &e.to_string()).await?);
            }
            Err(UpstreamError::InvalidUrl(e)) => {
                self.breaker.record_failure();
                return Ok(self.on_api_failure(tip, &e.to_string()).await?);
            }
        };

        // Step 4: classify.
        if response.status == 200 {
            self.breaker.record_success();
        } else if response.status == 429 {
            self.breaker.record_failure();
            self.store.record_rate_limited(tip).await?;
            warn!(tip, "rate limited, sleeping cooldown");
            self.sleep_interruptible(self.too_many_requests_sleep).await;
            return Ok(Outcome::TransientFail);
        } else if response.status == 404 {
            self.breaker.record_failure();
            self.store.record_not_found(tip).await?;
            return Ok(Outcome::NotFound);
        } else {
            self.breaker.record_failure();
            let classified = classify_status(response.status, &response.body);
            let message = classified.map(|c| c.to_string()).unwrap_or_else(|| format!("HTTP {}", response.status));
            if matches!(
                classify_status(response.status, &response.body),
                Some(ClassifiedError::Unauthorized { .. }) | Some(ClassifiedError::Forbidden { .. })
            ) {
                self.store.record_processing_error(tip, "upstream_auth", &message, None).await?;
                return Ok(self.fail_permanently(tip, &message).await?);
            }
            return Ok(self.on_api_failure(tip, &message).await?);
        }

        let payload: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| ProcessorError::InvalidPayload(format!("tip {tip}: {e}")))?;

        // Step 5: field mapping.
        let extractor = AttachmentExtractor::new(kind.attachment_stub_overrides.clone());
        let attachments = extractor.extract(&payload);

        let extracted = self.mapper.extract(kind, &payload, tip).await?;
        self.store.upsert_success_fields(tip, &extracted, attachments.len() as i64).await?;

        let inspection_id = extracted.inspection_id.clone().unwrap_or_else(|| kind.unknown_placeholder.clone());

        // Step 6: folder + report.
        let folder_manager = FolderManager::new(
            self.output_root.clone(),
            kind.abbreviation.clone(),
            kind.folder_pattern.clone(),
            kind.filename_pattern.clone(),
        );
        let inspection_folder = folder_manager.create_inspection_folder(extracted.inspection_date.as_deref(), &inspection_id)?;

        let report = self
            .renderer
            .render(kind, &payload, tip, &inspection_id, attachments.len())
            .await?;
        let report_filename = format!("{}_inspection_data.txt", tipflow_attachments::sanitise_filename(&inspection_id));
        tokio::fs::write(inspection_folder.join(report_filename), report).await?;

        // Step 7: download attachments in enumeration order.
        let mut completed_filenames = Vec::new();
        let mut any_failed = false;
        let mut interrupted = false;

        for (index, attachment) in attachments.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                interrupted = true;
                break;
            }

            let filename = folder_manager.construct_attachment_filename(
                &inspection_id,
                extracted.inspection_date.as_deref(),
                &attachment.stub,
                attachment.sequence_in_field,
            );

            let outcome = self
                .downloader
                .download(&attachment.url, &filename, &attachment.attachment_tip, &inspection_folder, tip, attachment.sequence_in_field)
                .await?;

            if outcome.success {
                completed_filenames.push(filename);
            } else {
                any_failed = true;
            }

            if index + 1 != attachments.len() && !self.attachment_pause.is_zero() {
                self.sleep_interruptible(self.attachment_pause).await;
            }
        }

        let completed_count = completed_filenames.len();

        self.journal.append(tip, &inspection_id, completed_count, &completed_filenames).await?;

        if interrupted {
            self.store.record_interrupted(tip).await?;
            return Ok(Outcome::Interrupted);
        }

        // Step 8: final status.
        let (final_status, outcome) = if !attachments.is_empty() && completed_count == 0 {
            (ProcessingStatus::Failed, Outcome::TransientFail)
        } else if any_failed {
            (ProcessingStatus::Partial, Outcome::Partial)
        } else {
            (ProcessingStatus::Complete, Outcome::Complete)
        };

        self.store
            .finalize_attachment_outcome(tip, final_status, completed_count as i64, !any_failed)
            .await?;

        if matches!(final_status, ProcessingStatus::Partial | ProcessingStatus::Failed) {
            let item = self.store.get_work_item(tip).await?;
            let retry_count = item.map(|i| i.retry_count).unwrap_or(0);
            self.schedule_next_retry(tip, final_status, retry_count as u32).await?;
        }

        Ok(outcome)
    }

    async fn on_api_failure(&self, tip: &str, message: &str) -> Result<Outcome> {
        self.store.record_processing_error(tip, "upstream_transient", message, None).await?;
        let item = self.store.get_work_item(tip).await?;
        let retry_count = item.map(|i| i.retry_count).unwrap_or(0);
        let new_retry_count = retry_count as u32 + 1;

        if self.retry.should_retry(new_retry_count) {
            let next_retry_at = self.retry.next_retry_at(new_retry_count);
            self.store
                .schedule_retry(tip, ProcessingStatus::ApiError, next_retry_at, false, Some(message))
                .await?;
            Ok(Outcome::TransientFail)
        } else {
            self.store
                .schedule_retry(tip, ProcessingStatus::PermanentlyFailed, None, true, Some(message))
                .await?;
            Ok(Outcome::PermanentFail)
        }
    }

    async fn fail_permanently(&self, tip: &str, message: &str) -> Result<Outcome> {
        self.store
            .schedule_retry(tip, ProcessingStatus::PermanentlyFailed, None, true, Some(message))
            .await?;
        Ok(Outcome::PermanentFail)
    }

    async fn schedule_next_retry(&self, tip: &str, status_on_retry: ProcessingStatus, retry_count: u32) -> Result<()> {
        let new_retry_count = retry_count + 1;
        if self.retry.should_retry(new_retry_count) {
            let next_retry_at = self.retry.next_retry_at(new_retry_count);
            self.store
                .schedule_retry(tip, status_on_retry, next_retry_at, false, None)
                .await?;
        } else {
            self.store
                .schedule_retry(tip, ProcessingStatus::PermanentlyFailed, None, true, Some("max retry attempts exceeded"))
                .await?;
        }
        Ok(())
    }

    async fn schedule_or_fail(&self, tip: &str, message: &str) -> Result<()> {
        self.store.record_processing_error(tip, "processing", message, None).await?;
        let item = self.store.get_work_item(tip).await?;
        let retry_count = item.map(|i| i.retry_count).unwrap_or(0) as u32;
        self.schedule_next_retry(tip, ProcessingStatus::ApiError, retry_count).await
    }

    /// Sleeps in 1-second increments so the shutdown flag can interrupt a
    /// long wait.
    async fn sleep_interruptible(&self, duration: Duration) {
        let mut remaining = duration;
        let step = Duration::from_secs(1);
        while remaining > Duration::ZERO {
            if self.cancellation.is_cancelled() {
                return;
            }
            let chunk = remaining.min(step);
            tokio::time::sleep(chunk).await;
            remaining -= chunk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tipflow_config::{FieldMapping, RetryConfig};
    use tipflow_hash::HashResolver;
    use tipflow_protocol::ValueType;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_kind(endpoint_template: String) -> KindSchema {
        KindSchema {
            abbreviation: "LCD".to_string(),
            full_name: "Load Compliance Check".to_string(),
            endpoint_template,
            id_field_upstream: "lcdInspectionId".to_string(),
            id_field_column: "inspection_id".to_string(),
            date_field: "date".to_string(),
            unknown_placeholder: "Unknown".to_string(),
            report_template: None,
            folder_pattern: "{abbreviation}/{inspection_id}".to_string(),
            filename_pattern: "{abbreviation}_{inspection_id}_{stub}_{sequence}.jpg".to_string(),
            field_mappings: vec![FieldMapping {
                upstream_field: "driverCount".to_string(),
                store_column: "driver_count".to_string(),
                value_type: ValueType::Int,
                hash_type: None,
            }],
            attachment_stub_overrides: HashMap::new(),
        }
    }

    fn test_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(tipflow_breaker::CircuitBreakerConfig {
            window_size: 20,
            failure_threshold: 0.5,
            recovery_threshold: 0.3,
            open_duration: Duration::from_secs(60),
        }))
    }

    fn test_upstream(base_url: &str, breaker: Arc<CircuitBreaker>) -> UpstreamClient {
        UpstreamClient::new(
            &tipflow_config::UpstreamConfig {
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
            breaker,
        )
        .unwrap()
    }

    async fn build_processor(server: &MockServer, output_root: &std::path::Path, journal_path: PathBuf) -> TipProcessor {
        let store = Store::connect("sqlite::memory:", 1).await.unwrap();
        let breaker = test_breaker();
        let upstream = test_upstream(&server.uri(), breaker.clone());
        let hash_resolver = HashResolver::new(store.clone(), output_root.join("unknown_hashes.log"));
        let mapper = FieldMapper::new(hash_resolver.clone());
        let renderer = ReportRenderer::new(hash_resolver, "%Y-%m-%d".to_string());
        let downloader = AttachmentDownloader::new(store.clone(), test_upstream(&server.uri(), breaker.clone()), 8, Duration::from_millis(0));
        let retry = RetryScheduler::new(&RetryConfig {
            base_retry_delay_minutes: 5.0,
            backoff_multiplier: 2.0,
            max_retry_delay_hours: 24.0,
            max_retry_attempts: 3,
        });
        let journal = SessionJournal::new(journal_path);

        TipProcessor::new(
            store,
            breaker,
            upstream,
            mapper,
            renderer,
            downloader,
            retry,
            journal,
            output_root,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn successful_fetch_with_no_attachments_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lcd/tip1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"lcdInspectionId":"LCD-1","date":"2025-06-15T00:00:00Z","driverCount":2}"#))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let processor = build_processor(&server, dir.path(), dir.path().join("session.tsv")).await;
        processor.store.insert_pending("tip1", "LCD", None, None, None).await.unwrap();

        let kind = test_kind("/lcd/$tip".to_string());
        let outcome = processor.process("tip1", &kind).await;

        assert_eq!(outcome, Outcome::Complete);
        let item = processor.store.get_work_item("tip1").await.unwrap().unwrap();
        assert_eq!(item.status, ProcessingStatus::Complete);
    }

    #[tokio::test]
    async fn not_found_marks_terminal_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lcd/tip2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let processor = build_processor(&server, dir.path(), dir.path().join("session.tsv")).await;
        processor.store.insert_pending("tip2", "LCD", None, None, None).await.unwrap();

        let kind = test_kind("/lcd/$tip".to_string());
        let outcome = processor.process("tip2", &kind).await;

        assert_eq!(outcome, Outcome::NotFound);
        let item = processor.store.get_work_item("tip2").await.unwrap().unwrap();
        assert_eq!(item.status, ProcessingStatus::NotFound);
    }

    #[tokio::test]
    async fn server_error_schedules_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lcd/tip3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let processor = build_processor(&server, dir.path(), dir.path().join("session.tsv")).await;
        processor.store.insert_pending("tip3", "LCD", None, None, None).await.unwrap();

        let kind = test_kind("/lcd/$tip".to_string());
        let outcome = processor.process("tip3", &kind).await;

        assert_eq!(outcome, Outcome::TransientFail);
        let item = processor.store.get_work_item("tip3").await.unwrap().unwrap();
        assert_eq!(item.status, ProcessingStatus::ApiError);
        assert!(item.next_retry_at.is_some());
        assert_eq!(item.retry_count, 1);
    }
}
