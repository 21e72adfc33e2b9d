//! Wire types for the HTTP surface (§6). Kept separate from the SeaORM
//! entity models so the on-disk shape and the public API shape can drift
//! independently.

use chrono::{DateTime, Utc};
use cnab_ingest_entity::sea_orm_active_enums::FileUploadStatus;
use cnab_ingest_logic::FileUpload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UploadView {
    pub id: Uuid,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub status: FileUploadStatus,
    pub total_line_count: Option<i64>,
    pub processed_line_count: i64,
    pub failed_line_count: i64,
    pub skipped_line_count: i64,
    pub last_checkpoint_line: i64,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

impl From<FileUpload> for UploadView {
    fn from(model: FileUpload) -> Self {
        Self {
            id: model.id,
            file_name: model.file_name,
            file_hash: model.file_hash,
            file_size: model.file_size,
            status: model.status,
            total_line_count: model.total_line_count,
            processed_line_count: model.processed_line_count,
            failed_line_count: model.failed_line_count,
            skipped_line_count: model.skipped_line_count,
            last_checkpoint_line: model.last_checkpoint_line,
            retry_count: model.retry_count,
            error_message: model.error_message,
            uploaded_at: model.uploaded_at.into(),
            processing_started_at: model.processing_started_at.map(Into::into),
            processing_completed_at: model.processing_completed_at.map(Into::into),
            last_checkpoint_at: model.last_checkpoint_at.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadAcceptedView {
    Accepted { upload: UploadView },
}

/// `§4.10` step 9's synchronous-compatibility-mode response: the request
/// drove processing inline, so the caller gets the outcome immediately
/// instead of having to poll the status endpoint.
#[derive(Debug, Serialize)]
pub struct SyncUploadView {
    pub upload: UploadView,
    pub transaction_count: i64,
    pub failed_line_count: i64,
    pub skipped_line_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DuplicateFileView {
    pub existing_upload_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListUploadsQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<FileUploadStatus>,
}

#[derive(Debug, Serialize)]
pub struct ListUploadsView {
    pub items: Vec<UploadView>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct TimeoutQuery {
    pub timeout_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResumeAllView {
    pub enqueued: Vec<Uuid>,
    pub skipped: Vec<SkippedUpload>,
}

#[derive(Debug, Serialize)]
pub struct SkippedUpload {
    pub upload_id: Uuid,
    pub reason: &'static str,
}
