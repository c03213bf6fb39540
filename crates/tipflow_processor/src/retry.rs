//! WorkItem-level retry scheduling, distinct from the
//! intra-request backoff in `tipflow_upstream`. Ported from
//! `original_source/processors/base_processor.py:RetryManager`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tipflow_config::RetryConfig;

#[derive(Clone)]
pub struct RetryScheduler {
    base_retry_delay_minutes: f64,
    backoff_multiplier: f64,
    max_retry_delay_hours: f64,
    max_retry_attempts: u32,
}

impl RetryScheduler {
    pub fn new(config: &RetryConfig) -> Self {
        RetryScheduler {
            base_retry_delay_minutes: config.base_retry_delay_minutes,
            backoff_multiplier: config.backoff_multiplier,
            max_retry_delay_hours: config.max_retry_delay_hours,
            max_retry_attempts: config.max_retry_attempts,
        }
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retry_attempts
    }

    /// `next_retry_at` for the given retry count, or `None` once retries are
    /// exhausted (caller should set `permanently_failed = true` instead).
    pub fn next_retry_at(&self, retry_count: u32) -> Option<DateTime<Utc>> {
        if !self.should_retry(retry_count) {
            return None;
        }
        let delay_minutes = (self.base_retry_delay_minutes * self.backoff_multiplier.powi(retry_count as i32))
            .min(self.max_retry_delay_hours * 60.0);
        Some(Utc::now() + ChronoDuration::milliseconds((delay_minutes * 60_000.0) as i64))
    }
}
