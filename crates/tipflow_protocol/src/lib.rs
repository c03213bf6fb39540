//! Shared enums and constants for the ingestion/enrichment pipeline.
//!
//! Everything here is inert data: no I/O, no component depends on another
//! component through this crate, only on its vocabulary.

use serde::{Deserialize, Serialize};

/// A work item's place in the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    CsvImported,
    ApiRetrying,
    ApiSuccess,
    ApiError,
    Downloading,
    Complete,
    Partial,
    Failed,
    Interrupted,
    NotFound,
    PermanentlyFailed,
    /// Terminal, operator-set: skip forever without counting as a failure.
    Ignore,
}

impl ProcessingStatus {
    /// Statuses eligible for a processing attempt.
    pub fn is_eligible(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Pending
                | ProcessingStatus::CsvImported
                | ProcessingStatus::ApiError
                | ProcessingStatus::Partial
                | ProcessingStatus::Failed
        )
    }

    /// Batch ordering priority, lower sorts first.
    pub fn batch_priority(self) -> u8 {
        match self {
            ProcessingStatus::Pending => 1,
            ProcessingStatus::CsvImported => 2,
            ProcessingStatus::Partial => 3,
            ProcessingStatus::ApiError => 4,
            ProcessingStatus::Failed => 5,
            _ => 99,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Complete
                | ProcessingStatus::NotFound
                | ProcessingStatus::PermanentlyFailed
                | ProcessingStatus::Ignore
        )
    }
}

/// Outcome of one `TipProcessor::process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Partial,
    Interrupted,
    NotFound,
    TransientFail,
    PermanentFail,
}

/// Per-attachment download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AttachmentStatus {
    Pending,
    Downloading,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Valid,
    ValidationFailed,
}

/// Category of opaque hash being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum LookupType {
    Vehicle,
    Trailer,
    Team,
    Department,
    Uhf,
    Unknown,
}

impl std::fmt::Display for LookupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LookupType::Vehicle => "vehicle",
            LookupType::Trailer => "trailer",
            LookupType::Team => "team",
            LookupType::Department => "department",
            LookupType::Uhf => "uhf",
            LookupType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Declared type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Datetime,
    Json,
    Hash,
}

pub mod defaults {
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_ATTACHMENT_TIMEOUT_SECS: u64 = 60;
    pub const DEFAULT_MIN_ATTACHMENT_SIZE_BYTES: u64 = 1024;
    pub const DEFAULT_UNKNOWN_PLACEHOLDER: &str = "Unknown";
    pub const DEFAULT_CIRCUIT_WINDOW_SIZE: usize = 20;
    pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_RECOVERY_THRESHOLD: f64 = 0.3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_statuses_match_spec() {
        assert!(ProcessingStatus::Pending.is_eligible());
        assert!(ProcessingStatus::CsvImported.is_eligible());
        assert!(ProcessingStatus::ApiError.is_eligible());
        assert!(ProcessingStatus::Partial.is_eligible());
        assert!(ProcessingStatus::Failed.is_eligible());
        assert!(!ProcessingStatus::Complete.is_eligible());
        assert!(!ProcessingStatus::PermanentlyFailed.is_eligible());
        assert!(!ProcessingStatus::Ignore.is_eligible());
    }

    #[test]
    fn batch_priority_ordering() {
        let mut statuses = vec![
            ProcessingStatus::Failed,
            ProcessingStatus::ApiError,
            ProcessingStatus::Pending,
            ProcessingStatus::Partial,
            ProcessingStatus::CsvImported,
        ];
        statuses.sort_by_key(|s| s.batch_priority());
        assert_eq!(
            statuses,
            vec![
                ProcessingStatus::Pending,
                ProcessingStatus::CsvImported,
                ProcessingStatus::Partial,
                ProcessingStatus::ApiError,
                ProcessingStatus::Failed,
            ]
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(ProcessingStatus::Complete.is_terminal());
        assert!(ProcessingStatus::NotFound.is_terminal());
        assert!(ProcessingStatus::PermanentlyFailed.is_terminal());
        assert!(ProcessingStatus::Ignore.is_terminal());
        assert!(!ProcessingStatus::ApiRetrying.is_terminal());
    }
}
