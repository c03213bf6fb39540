use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error(transparent)]
    Hash(#[from] tipflow_hash::HashError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;
