//! Shared logging init for tipflow binaries.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tipflow=info";

/// Logging configuration shared by tipflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a daily-rolling file writer and a stderr layer.
///
/// The returned [`WorkerGuard`] flushes the non-blocking file writer on
/// drop; the caller must hold it for the lifetime of `main`.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("failed to ensure log directory")?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, sanitize_name(config.app_name));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

/// The tipflow home directory: `~/.tipflow`, overridable via `TIPFLOW_HOME`.
pub fn tipflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TIPFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("could not determine home directory")
        .join(".tipflow")
}

/// The logs directory: `~/.tipflow/logs`.
pub fn logs_dir() -> PathBuf {
    tipflow_home().join("logs")
}

/// Ensure the logs directory exists, creating it if absent.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    std::fs::create_dir_all(&logs)
        .with_context(|| format!("failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_replaces_unsafe_characters() {
        assert_eq!(sanitize_name("tip flow/runner"), "tip_flow_runner");
    }

    #[test]
    fn tipflow_home_honours_env_override() {
        std::env::set_var("TIPFLOW_HOME", "/tmp/tipflow-test-home");
        assert_eq!(tipflow_home(), PathBuf::from("/tmp/tipflow-test-home"));
        std::env::remove_var("TIPFLOW_HOME");
    }
}
