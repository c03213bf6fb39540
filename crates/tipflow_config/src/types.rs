use serde::Deserialize;
use std::collections::HashMap;
use tipflow_protocol::{defaults, LookupType, ValueType};

use crate::error::{ConfigError, Result};

/// Top-level config file shape, deserialized directly from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    #[serde(default)]
    pub attachments: AttachmentsConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub sftp: SftpConfig,
    pub runner: RunnerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default, rename = "kinds")]
    pub kinds: Vec<RawKindConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub media_service_url: String,
    pub namespace: String,
    pub token: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_attachment_timeout")]
    pub attachment_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: f64,
    #[serde(default = "default_too_many_requests_sleep")]
    pub too_many_requests_sleep_secs: u64,
}

fn default_request_timeout() -> u64 {
    defaults::DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_attachment_timeout() -> u64 {
    defaults::DEFAULT_ATTACHMENT_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_backoff() -> f64 {
    60.0
}
fn default_too_many_requests_sleep() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: f64,
    #[serde(default = "default_open_duration")]
    pub open_duration_secs: u64,
}

fn default_window_size() -> usize {
    defaults::DEFAULT_CIRCUIT_WINDOW_SIZE
}
fn default_failure_threshold() -> f64 {
    defaults::DEFAULT_FAILURE_THRESHOLD
}
fn default_recovery_threshold() -> f64 {
    defaults::DEFAULT_RECOVERY_THRESHOLD
}
fn default_open_duration() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            open_duration_secs: default_open_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub base_retry_delay_minutes: f64,
    pub backoff_multiplier: f64,
    pub max_retry_delay_hours: f64,
    pub max_retry_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentsConfig {
    #[serde(default = "default_min_size")]
    pub min_size_bytes: u64,
    #[serde(default = "default_attachment_pause")]
    pub attachment_pause_ms: u64,
    #[serde(default = "default_output_root")]
    pub output_root: String,
}

fn default_min_size() -> u64 {
    defaults::DEFAULT_MIN_ATTACHMENT_SIZE_BYTES
}
fn default_attachment_pause() -> u64 {
    250
}
fn default_output_root() -> String {
    "./output".to_string()
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: default_min_size(),
            attachment_pause_ms: default_attachment_pause(),
            output_root: default_output_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub etl_root: String,
    pub unknown_hashes_log: String,
    pub session_journal_dir: String,
    #[serde(default = "default_audit_trail")]
    pub audit_trail_enabled: bool,
}

fn default_audit_trail() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SftpConfig {
    #[serde(default)]
    pub enabled: bool,
    pub host: Option<String>,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub private_key_path: Option<String>,
    pub remote_dir: Option<String>,
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
    #[serde(default = "default_sftp_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_sftp_connect_timeout() -> u64 {
    10
}

fn default_sftp_port() -> u16 {
    22
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_cycle_sleep")]
    pub cycle_sleep_secs: u64,
    #[serde(default = "default_tips_per_cycle")]
    pub tips_per_type_per_cycle: u32,
    #[serde(default = "default_sftp_every_n")]
    pub sftp_every_n_cycles: u32,
    #[serde(default = "default_csv_every_n")]
    pub csv_every_n_cycles: u32,
    pub enabled_kinds: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
}

fn default_cycle_sleep() -> u64 {
    30
}
fn default_tips_per_cycle() -> u32 {
    20
}
fn default_sftp_every_n() -> u32 {
    10
}
fn default_csv_every_n() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawKindConfig {
    pub abbreviation: String,
    pub full_name: String,
    pub endpoint_template: String,
    pub id_field_upstream: String,
    pub id_field_column: String,
    pub date_field: String,
    #[serde(default = "default_unknown_placeholder")]
    pub unknown_placeholder: String,
    #[serde(default)]
    pub report_template: Option<String>,
    #[serde(default)]
    pub report_template_path: Option<String>,
    #[serde(default = "default_folder_pattern")]
    pub folder_pattern: String,
    #[serde(default = "default_filename_pattern")]
    pub filename_pattern: String,
    #[serde(default)]
    pub field_mappings: Vec<RawFieldMapping>,
    #[serde(default)]
    pub attachment_stub_overrides: HashMap<String, String>,
}

fn default_unknown_placeholder() -> String {
    defaults::DEFAULT_UNKNOWN_PLACEHOLDER.to_string()
}
fn default_folder_pattern() -> String {
    "{abbreviation}/{year}/{month}/{date} {inspection_id}".to_string()
}
fn default_filename_pattern() -> String {
    "{abbreviation}_{inspection_id}_{date}_{stub}_{sequence}.jpg".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFieldMapping {
    pub upstream_field: String,
    pub store_column: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub hash_type: Option<LookupType>,
}

/// A validated, immutable field mapping.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub upstream_field: String,
    pub store_column: String,
    pub value_type: ValueType,
    pub hash_type: Option<LookupType>,
}

/// A validated, immutable per-kind schema, compiled once at startup.
#[derive(Debug, Clone)]
pub struct KindSchema {
    pub abbreviation: String,
    pub full_name: String,
    pub endpoint_template: String,
    pub id_field_upstream: String,
    pub id_field_column: String,
    pub date_field: String,
    pub unknown_placeholder: String,
    pub report_template: Option<String>,
    pub folder_pattern: String,
    pub filename_pattern: String,
    pub field_mappings: Vec<FieldMapping>,
    pub attachment_stub_overrides: HashMap<String, String>,
}

impl KindSchema {
    fn from_raw(raw: RawKindConfig) -> Result<Self> {
        if raw.abbreviation.trim().is_empty() {
            return Err(ConfigError::invalid("kind abbreviation must not be empty"));
        }

        let mut field_mappings = Vec::with_capacity(raw.field_mappings.len());
        for fm in raw.field_mappings {
            if fm.value_type == ValueType::Hash && fm.hash_type.is_none() {
                return Err(ConfigError::invalid(format!(
                    "kind {}: field {} has value_type=hash but no hash_type",
                    raw.abbreviation, fm.upstream_field
                )));
            }
            field_mappings.push(FieldMapping {
                upstream_field: fm.upstream_field,
                store_column: fm.store_column,
                value_type: fm.value_type,
                hash_type: fm.hash_type,
            });
        }

        let report_template = match raw.report_template_path {
            Some(path) => Some(std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::Io {
                    path: path.clone(),
                    source,
                }
            })?),
            None => raw.report_template,
        };

        Ok(KindSchema {
            abbreviation: raw.abbreviation,
            full_name: raw.full_name,
            endpoint_template: raw.endpoint_template,
            id_field_upstream: raw.id_field_upstream,
            id_field_column: raw.id_field_column,
            date_field: raw.date_field,
            unknown_placeholder: raw.unknown_placeholder,
            report_template,
            folder_pattern: raw.folder_pattern,
            filename_pattern: raw.filename_pattern,
            field_mappings,
            attachment_stub_overrides: raw.attachment_stub_overrides,
        })
    }
}

pub(crate) fn compile_kinds(raw: Vec<RawKindConfig>) -> Result<HashMap<String, KindSchema>> {
    let mut map = HashMap::with_capacity(raw.len());
    for k in raw {
        let schema = KindSchema::from_raw(k)?;
        if map.insert(schema.abbreviation.clone(), schema).is_some() {
            return Err(ConfigError::invalid("duplicate kind abbreviation in config"));
        }
    }
    Ok(map)
}
