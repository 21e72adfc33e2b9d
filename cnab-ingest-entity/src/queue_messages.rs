use sea_orm::entity::prelude::*;

use crate::sea_orm_active_enums::QueueMessageStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "queue_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub consumer_group: String,
    pub file_upload_id: Uuid,
    pub storage_path: String,
    pub status: QueueMessageStatus,
    pub retry_count: i32,
    pub enqueued_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
