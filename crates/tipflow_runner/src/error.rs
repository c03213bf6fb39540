use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] tipflow_store::StoreError),

    #[error(transparent)]
    Poller(#[from] tipflow_poller::PollerError),

    #[error("runner.enabled_kinds names {0}, which has no compiled KindSchema")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
