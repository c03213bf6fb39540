use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("csv error reading {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("{path} has no recognisable header row")]
    UnrecognisedHeader { path: String },

    #[error("io error at {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error(transparent)]
    Store(#[from] tipflow_store::StoreError),

    #[error("sftp connect failed: {0}")]
    SftpConnect(String),

    #[error("sftp operation failed: {0}")]
    Sftp(String),

    #[error("sftp is not enabled in config")]
    SftpDisabled,
}

pub type Result<T> = std::result::Result<T, PollerError>;
