use sea_orm::entity::prelude::*;

use crate::sea_orm_active_enums::FileUploadStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "file_uploads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub storage_path: String,
    pub status: FileUploadStatus,
    pub total_line_count: Option<i64>,
    pub processed_line_count: i64,
    pub failed_line_count: i64,
    pub skipped_line_count: i64,
    pub last_checkpoint_line: i64,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub uploaded_at: DateTimeWithTimeZone,
    pub processing_started_at: Option<DateTimeWithTimeZone>,
    pub processing_completed_at: Option<DateTimeWithTimeZone>,
    pub last_checkpoint_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_upload_line_hashes::Entity")]
    FileUploadLineHashes,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::file_upload_line_hashes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileUploadLineHashes.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
