use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Store(#[from] tipflow_store::StoreError),
    #[error(transparent)]
    Mapper(#[from] tipflow_mapper::MapperError),
    #[error(transparent)]
    Report(#[from] tipflow_report::ReportError),
    #[error(transparent)]
    Attachment(#[from] tipflow_attachments::AttachmentError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
