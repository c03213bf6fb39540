//! Startup configuration for the ingestion/enrichment pipeline.
//!
//! Loaded once into an immutable [`Config`] and shared by `Arc`; nothing
//! downstream may mutate it.

mod error;
mod types;

pub use error::{ConfigError, Result};
pub use types::{
    AttachmentsConfig, CircuitBreakerConfig, FieldMapping, KindSchema, PathsConfig, ReportConfig,
    RetryConfig, RunnerConfig, SftpConfig, StoreConfig, UpstreamConfig,
};

use std::collections::HashMap;
use std::path::Path;
use types::RawConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub attachments: AttachmentsConfig,
    pub paths: PathsConfig,
    pub sftp: SftpConfig,
    pub runner: RunnerConfig,
    pub report: ReportConfig,
    pub kinds: HashMap<String, KindSchema>,
}

impl Config {
    /// Load and validate a config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, path_for_errors: &str) -> Result<Self> {
        let mut raw: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path_for_errors.to_string(),
            source,
        })?;

        raw.upstream.token = resolve_env_placeholder(&raw.upstream.token)?;

        let kinds = types::compile_kinds(std::mem::take(&mut raw.kinds))?;

        for abbrev in &raw.runner.enabled_kinds {
            if !kinds.contains_key(abbrev) {
                return Err(ConfigError::invalid(format!(
                    "runner.enabled_kinds references undefined kind {abbrev}"
                )));
            }
        }

        Ok(Config {
            store: raw.store,
            upstream: raw.upstream,
            circuit_breaker: raw.circuit_breaker,
            retry: raw.retry,
            attachments: raw.attachments,
            paths: raw.paths,
            sftp: raw.sftp,
            runner: raw.runner,
            report: raw.report,
            kinds,
        })
    }

    pub fn kind(&self, abbreviation: &str) -> Option<&KindSchema> {
        self.kinds.get(abbreviation)
    }
}

/// Resolves a single `${VAR_NAME}` placeholder, otherwise returns the value
/// unchanged. Used for secrets like `upstream.token` that shouldn't be
/// committed to the config file.
fn resolve_env_placeholder(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if let Some(inner) = trimmed.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return std::env::var(inner).map_err(|_| ConfigError::MissingEnvVar(inner.to_string()));
    }
    Ok(value.to_string())
}
