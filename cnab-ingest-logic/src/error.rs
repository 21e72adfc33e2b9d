use uuid::Uuid;

/// Stable error taxonomy the core emits across its component boundary.
///
/// Internal plumbing is free to use `anyhow::Result` with attached context;
/// anything that crosses into the HTTP layer (or otherwise needs to be
/// matched on by a caller) is collapsed into one of these variants.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("unsupported media type: {reason}")]
    UnsupportedMediaType { reason: String },

    #[error("duplicate file, already tracked as upload {existing_upload_id}")]
    DuplicateFile { existing_upload_id: Uuid },

    #[error("file stored but {failed_line_count} line(s) failed to parse")]
    UnprocessableContent { failed_line_count: u64 },

    #[error("object storage failure: {0:#}")]
    StorageFailure(anyhow::Error),

    #[error("queue failure: {0:#}")]
    QueueFailure(anyhow::Error),

    #[error("transient state error: {0:#}")]
    TransientStateError(anyhow::Error),

    #[error("upload {upload_id} not found")]
    NotFound { upload_id: Uuid },

    #[error("internal error: {0:#}")]
    InternalError(anyhow::Error),
}

impl IngestError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::InternalError(err.into())
    }
}

impl From<sea_orm::DbErr> for IngestError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::TransientStateError(err.into())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
