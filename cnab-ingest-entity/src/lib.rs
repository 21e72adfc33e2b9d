pub mod distributed_locks;
pub mod file_upload_line_hashes;
pub mod file_uploads;
pub mod queue_dead_letters;
pub mod queue_messages;
pub mod sea_orm_active_enums;
pub mod transactions;

pub use sea_orm_active_enums::{FileUploadStatus, QueueMessageStatus};
