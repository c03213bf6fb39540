use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Hash(#[from] tipflow_hash::HashError),
}

pub type Result<T> = std::result::Result<T, ReportError>;
