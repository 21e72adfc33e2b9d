use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "transactions" (
                "id" bigserial PRIMARY KEY,
                "file_upload_id" uuid NOT NULL REFERENCES "file_uploads" ("id"),
                "idempotency_key" text NOT NULL,
                "line_index" bigint NOT NULL,
                "bank_code" text NOT NULL,
                "cpf_cnpj" text NOT NULL,
                "nature_code" smallint NOT NULL,
                "amount_cents" bigint NOT NULL,
                "card" text NOT NULL,
                "store_owner" text NOT NULL,
                "store_name" text NOT NULL,
                "transaction_date" date NOT NULL,
                "transaction_time" time NOT NULL,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE UNIQUE INDEX "transactions_idempotency_key_key" ON "transactions" ("idempotency_key");
            CREATE INDEX "transactions_file_upload_id_idx" ON "transactions" ("file_upload_id");

            COMMENT ON TABLE "transactions" IS 'One row per successfully parsed CNAB line';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"DROP TABLE "transactions";"#;
        crate::from_sql(manager, sql).await
    }
}
