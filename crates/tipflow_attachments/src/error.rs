use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error(transparent)]
    Store(#[from] tipflow_store::StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("attachment validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, AttachmentError>;
