use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error(transparent)]
    Store(#[from] tipflow_store::StoreError),
    #[error("csv error reading {path}: {source}")]
    Csv { path: String, source: csv::Error },
    #[error("{path} is missing required column(s): {missing}")]
    MissingColumns { path: String, missing: String },
    #[error("io error writing unknown-hashes log: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HashError>;
