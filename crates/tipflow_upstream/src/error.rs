use thiserror::Error;

const BODY_TRUNCATE_LEN: usize = 500;

/// Transport-level failure after exhausting retries. HTTP status
/// codes are *not* represented here; those are classified separately by
/// [`crate::classify_status`] so the caller (TipProcessor) can apply its own
/// status-machine logic.
#[derive(Debug, Error)]
#[error("upstream request failed after {attempts} attempt(s): {source}")]
pub struct TransportError {
    pub attempts: u32,
    #[source]
    pub source: reqwest::Error,
}

/// HTTP-status classification surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("401 Unauthorized: {body}")]
    Unauthorized { body: String },
    #[error("403 Forbidden: {body}")]
    Forbidden { body: String },
    #[error("404 Not Found: {body}")]
    NotFound { body: String },
    #[error("429 Rate Limited: {body}")]
    RateLimited { body: String },
    #[error("{status} Client Error: {body}")]
    ClientError { status: u16, body: String },
    #[error("{status} Server Error: {body}")]
    ServerError { status: u16, body: String },
}

impl ClassifiedError {
    pub fn body(&self) -> &str {
        match self {
            ClassifiedError::Unauthorized { body }
            | ClassifiedError::Forbidden { body }
            | ClassifiedError::NotFound { body }
            | ClassifiedError::RateLimited { body } => body,
            ClassifiedError::ClientError { body, .. } | ClassifiedError::ServerError { body, .. } => body,
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() > BODY_TRUNCATE_LEN {
        let truncated: String = body.chars().take(BODY_TRUNCATE_LEN).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}

/// Classify a completed response's status.
/// Returns `None` for 2xx/3xx.
pub fn classify_status(status: u16, body: &str) -> Option<ClassifiedError> {
    let body = truncate_body(body);
    match status {
        401 => Some(ClassifiedError::Unauthorized { body }),
        403 => Some(ClassifiedError::Forbidden { body }),
        404 => Some(ClassifiedError::NotFound { body }),
        429 => Some(ClassifiedError::RateLimited { body }),
        400..=499 => Some(ClassifiedError::ClientError { status, body }),
        500..=599 => Some(ClassifiedError::ServerError { status, body }),
        _ => None,
    }
}
