//! Periodic throughput logging for a single kind's batch. Ported from `base_processor.py:ProgressTracker`.

use std::time::{Duration, Instant};

const LOG_INTERVAL: Duration = Duration::from_secs(10);

pub struct ProgressTracker {
    kind: String,
    total: usize,
    processed: usize,
    start: Instant,
    last_log: Instant,
}

impl ProgressTracker {
    pub fn new(kind: impl Into<String>, total: usize) -> Self {
        let now = Instant::now();
        ProgressTracker { kind: kind.into(), total, processed: 0, start: now, last_log: now }
    }

    pub fn increment(&mut self) {
        self.processed += 1;
    }

    /// Logs a throughput line if at least `LOG_INTERVAL` has elapsed since
    /// the last one.
    pub fn maybe_log(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_log) < LOG_INTERVAL {
            return;
        }
        self.last_log = now;

        let elapsed = now.duration_since(self.start).as_secs_f64();
        let rate = if elapsed > 0.0 { self.processed as f64 / elapsed } else { 0.0 };
        let remaining = self.total.saturating_sub(self.processed);
        let eta_secs = if rate > 0.0 { remaining as f64 / rate } else { 0.0 };

        tracing::info!(
            kind = %self.kind,
            processed = self.processed,
            total = self.total,
            percent = format!("{:.1}", self.processed as f64 / self.total.max(1) as f64 * 100.0),
            rate_per_sec = format!("{rate:.2}"),
            eta_secs = format!("{eta_secs:.0}"),
            "batch progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_processed_count() {
        let mut tracker = ProgressTracker::new("LCD", 5);
        tracker.increment();
        tracker.increment();
        assert_eq!(tracker.processed, 2);
    }
}
