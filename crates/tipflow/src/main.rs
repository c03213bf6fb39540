//! tipflow: ingestion and enrichment pipeline for third-party inspection
//! records.
//!
//! Usage:
//!     tipflow --config /etc/tipflow/config.toml
//!     tipflow --config /etc/tipflow/config.toml --once

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tipflow_attachments::AttachmentDownloader;
use tipflow_breaker::{CircuitBreaker, CircuitBreakerConfig};
use tipflow_hash::HashResolver;
use tipflow_mapper::FieldMapper;
use tipflow_poller::SourcePoller;
use tipflow_processor::{CancellationToken, RetryScheduler, SessionJournal, TipProcessor};
use tipflow_report::ReportRenderer;
use tipflow_runner::ContinuousRunner;
use tipflow_store::Store;
use tipflow_upstream::UpstreamClient;

#[derive(Parser, Debug)]
#[command(name = "tipflow", about = "Ingestion and enrichment pipeline for third-party inspection records")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Run exactly one cycle across every enabled kind, then exit
    #[arg(long)]
    once: bool,

    /// Raise the console log level to debug regardless of RUST_LOG
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = tipflow_logging::init_logging(tipflow_logging::LogConfig {
        app_name: "tipflow",
        verbose: args.verbose,
    })?;

    tracing::info!(config = %args.config.display(), once = args.once, "starting tipflow");

    let config = tipflow_config::Config::load(&args.config)?;

    let store = Store::connect(&config.store.database_url, config.store.pool_size).await?;
    store.ensure_kind_schemas(config.kinds.values()).await?;

    let hash_resolver = HashResolver::new(store.clone(), PathBuf::from(&config.paths.unknown_hashes_log));

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(&config.circuit_breaker)));

    let mapper = FieldMapper::new(hash_resolver.clone());
    let renderer = ReportRenderer::new(hash_resolver.clone(), config.report.date_format.clone());

    let downloader_upstream = UpstreamClient::new(&config.upstream, Arc::clone(&breaker))?;
    let downloader = AttachmentDownloader::new(
        store.clone(),
        downloader_upstream,
        config.attachments.min_size_bytes,
        std::time::Duration::from_millis(config.attachments.attachment_pause_ms),
    );

    let processor_upstream = UpstreamClient::new(&config.upstream, Arc::clone(&breaker))?;
    let retry = RetryScheduler::new(&config.retry);
    let journal = SessionJournal::new(&config.paths.session_journal_dir);
    let cancellation = CancellationToken::new();

    let processor = Arc::new(TipProcessor::new(
        store.clone(),
        Arc::clone(&breaker),
        processor_upstream,
        mapper,
        renderer,
        downloader,
        retry,
        journal,
        config.attachments.output_root.clone(),
        std::time::Duration::from_secs(config.upstream.too_many_requests_sleep_secs),
        cancellation.clone(),
    ));

    let poller = SourcePoller::new(
        store.clone(),
        config.kinds.clone(),
        config.sftp.clone(),
        &config.paths.etl_root,
        config.paths.audit_trail_enabled,
    )?;

    let mut runner = ContinuousRunner::new(store, poller, processor, &config, cancellation.clone())?;

    ContinuousRunner::spawn_signal_listener(cancellation.clone());

    if args.once {
        runner.run_cycle().await?;
    } else {
        runner.run().await;
    }

    tracing::info!("tipflow exiting");
    Ok(())
}
