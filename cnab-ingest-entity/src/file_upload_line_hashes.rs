use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "file_upload_line_hashes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub file_upload_id: Uuid,
    pub line_hash: String,
    pub line_content: String,
    pub processed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file_uploads::Entity",
        from = "Column::FileUploadId",
        to = "super::file_uploads::Column::Id"
    )]
    FileUpload,
}

impl Related<super::file_uploads::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileUpload.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
