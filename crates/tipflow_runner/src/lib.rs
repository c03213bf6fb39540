//! L. ContinuousRunner: the top-level scheduler loop that
//! round-robins kinds, interleaves SourcePoller cycles, and honours
//! cooperative shutdown. Ported from
//! `original_source/noggin_continuous_processor_modular.py`.

mod error;
mod progress;

pub use error::{Result, RunnerError};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tipflow_config::{Config, KindSchema, RunnerConfig};
use tipflow_poller::SourcePoller;
use tipflow_processor::CancellationToken;
use tipflow_processor::TipProcessor;
use tipflow_protocol::Outcome;
use tipflow_store::Store;

use progress::ProgressTracker;

#[derive(Debug, Default, Clone)]
struct KindStats {
    processed: u64,
    errors: u64,
}

/// Cumulative per-kind counters for the final shutdown summary, ported from
/// `ContinuousProcessor.stats`/`_log_final_summary`.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub cycles_completed: u64,
    per_kind: HashMap<String, KindStats>,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!("continuous processor shutdown, {} cycle(s) completed", self.cycles_completed);
        let mut total_processed = 0u64;
        let mut total_errors = 0u64;
        for (abbrev, stats) in &self.per_kind {
            tracing::info!(kind = %abbrev, processed = stats.processed, errors = stats.errors, "final kind summary");
            total_processed += stats.processed;
            total_errors += stats.errors;
        }
        tracing::info!(total_processed, total_errors, "final totals");
    }
}

pub struct ContinuousRunner {
    store: Store,
    poller: SourcePoller,
    processor: Arc<TipProcessor>,
    kinds: HashMap<String, KindSchema>,
    runner_config: RunnerConfig,
    cancellation: CancellationToken,
    cycle_count: u64,
    summary: RunSummary,
}

impl ContinuousRunner {
    pub fn new(
        store: Store,
        poller: SourcePoller,
        processor: Arc<TipProcessor>,
        config: &Config,
        cancellation: CancellationToken,
    ) -> Result<Self> {
        for abbrev in &config.runner.enabled_kinds {
            if !config.kinds.contains_key(abbrev) {
                return Err(RunnerError::UnknownKind(abbrev.clone()));
            }
        }

        Ok(ContinuousRunner {
            store,
            poller,
            processor,
            kinds: config.kinds.clone(),
            runner_config: config.runner.clone(),
            cancellation,
            cycle_count: 0,
            summary: RunSummary::default(),
        })
    }

    /// Runs a single cycle: due pollers, then one batch per enabled kind.
    /// Used by both the continuous loop and the `--once` CLI mode.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.cycle_count += 1;
        self.summary.cycles_completed = self.cycle_count;
        tracing::info!(cycle = self.cycle_count, "starting cycle");

        if self.runner_config.sftp_every_n_cycles > 0 && self.cycle_count % self.runner_config.sftp_every_n_cycles as u64 == 0 {
            match self.poller.run_sftp_cycle().await {
                Ok(summary) => tracing::info!(?summary, "sftp poll cycle complete"),
                Err(e) => tracing::error!(error = %e, "sftp poll cycle failed"),
            }
        }

        if self.runner_config.csv_every_n_cycles > 0 && self.cycle_count % self.runner_config.csv_every_n_cycles as u64 == 0 {
            match self.poller.run_local_cycle().await {
                Ok(summary) => tracing::info!(?summary, "local csv import cycle complete"),
                Err(e) => tracing::error!(error = %e, "local csv import cycle failed"),
            }
        }

        if self.runner_config.parallel {
            self.process_all_kinds_parallel().await?;
        } else {
            for abbrev in self.runner_config.enabled_kinds.clone() {
                if self.cancellation.is_cancelled() {
                    break;
                }
                self.process_kind_batch(&abbrev).await?;
            }
        }

        Ok(())
    }

    /// The continuous top-level loop: repeats `run_cycle`,
    /// sleeping interruptibly between cycles, until the shutdown flag is
    /// set. Never returns an error; per-cycle failures are logged and the
    /// loop continues, matching the original's broad catch-and-continue.
    pub async fn run(&mut self) -> RunSummary {
        while !self.cancellation.is_cancelled() {
            if let Err(e) = self.run_cycle().await {
                tracing::error!(cycle = self.cycle_count, error = %e, "error in cycle");
                self.sleep_interruptible(Duration::from_secs(30)).await;
                continue;
            }

            if !self.cancellation.is_cancelled() {
                self.sleep_interruptible(Duration::from_secs(self.runner_config.cycle_sleep_secs)).await;
            }
        }

        self.summary.log();
        self.summary.clone()
    }

    async fn process_kind_batch(&mut self, abbrev: &str) -> Result<()> {
        let Some(kind) = self.kinds.get(abbrev).cloned() else {
            return Err(RunnerError::UnknownKind(abbrev.to_string()));
        };

        let batch = self.store.fetch_eligible_batch(abbrev, self.runner_config.tips_per_type_per_cycle as i64).await?;
        if batch.is_empty() {
            return Ok(());
        }

        let stats = self.summary.per_kind.entry(abbrev.to_string()).or_default();
        let mut tracker = ProgressTracker::new(abbrev, batch.len());

        for item in batch {
            if self.cancellation.is_cancelled() {
                break;
            }
            let outcome = self.processor.process(&item.tip, &kind).await;
            stats.processed += 1;
            if outcome == Outcome::PermanentFail {
                stats.errors += 1;
            }
            tracker.increment();
            tracker.maybe_log();
        }

        Ok(())
    }

    /// Optional parallel mode: one task per enabled kind,
    /// dispatched concurrently. Each task still processes its own kind's
    /// batch sequentially; no intra-kind parallelism.
    async fn process_all_kinds_parallel(&mut self) -> Result<()> {
        let mut per_kind_batches = Vec::new();
        for abbrev in &self.runner_config.enabled_kinds {
            let kind = self.kinds.get(abbrev).cloned().ok_or_else(|| RunnerError::UnknownKind(abbrev.clone()))?;
            let batch = self.store.fetch_eligible_batch(abbrev, self.runner_config.tips_per_type_per_cycle as i64).await?;
            per_kind_batches.push((abbrev.clone(), kind, batch));
        }

        let mut tasks = Vec::new();
        for (abbrev, kind, batch) in per_kind_batches {
            if batch.is_empty() {
                continue;
            }
            let processor = Arc::clone(&self.processor);
            let cancellation = self.cancellation.clone();
            tasks.push(tokio::spawn(async move {
                let mut processed = 0u64;
                let mut errors = 0u64;
                let mut tracker = ProgressTracker::new(&abbrev, batch.len());
                for item in batch {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let outcome = processor.process(&item.tip, &kind).await;
                    processed += 1;
                    if outcome == Outcome::PermanentFail {
                        errors += 1;
                    }
                    tracker.increment();
                    tracker.maybe_log();
                }
                (abbrev, processed, errors)
            }));
        }

        for task in tasks {
            if let Ok((abbrev, processed, errors)) = task.await {
                let stats = self.summary.per_kind.entry(abbrev).or_default();
                stats.processed += processed;
                stats.errors += errors;
            }
        }

        Ok(())
    }

    /// Sleeps in 1-second increments, checking the shutdown flag between
    /// each.
    async fn sleep_interruptible(&self, total: Duration) {
        let mut remaining = total;
        let step = Duration::from_secs(1);
        while remaining > Duration::ZERO {
            if self.cancellation.is_cancelled() {
                return;
            }
            let this_step = step.min(remaining);
            tokio::time::sleep(this_step).await;
            remaining -= this_step;
        }
    }

    /// Listens for SIGINT/SIGTERM and sets the shared cancellation flag.
    /// Spawned once at startup by the binary entrypoint.
    pub fn spawn_signal_listener(cancellation: CancellationToken) {
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            tracing::warn!("shutdown signal received, finishing current TIP then exiting");
            cancellation.cancel();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            tracing::error!("second shutdown signal, forcing immediate exit");
            std::process::exit(1);
        });
    }
}
