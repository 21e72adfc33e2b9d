use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub file_upload_id: Uuid,
    pub idempotency_key: String,
    pub line_index: i64,
    pub bank_code: String,
    pub cpf_cnpj: String,
    pub nature_code: i16,
    pub amount_cents: i64,
    pub card: String,
    pub store_owner: String,
    pub store_name: String,
    pub transaction_date: Date,
    pub transaction_time: Time,
    pub created_at: DateTimeWithTimeZone,
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
