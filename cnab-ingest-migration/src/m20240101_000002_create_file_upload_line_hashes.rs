use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "file_upload_line_hashes" (
                "id" bigserial PRIMARY KEY,
                "file_upload_id" uuid NOT NULL REFERENCES "file_uploads" ("id"),
                "line_hash" text NOT NULL,
                "line_content" text NOT NULL,
                "processed_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE UNIQUE INDEX "file_upload_line_hashes_line_hash_key"
                ON "file_upload_line_hashes" ("line_hash");
            CREATE INDEX "file_upload_line_hashes_file_upload_id_idx"
                ON "file_upload_line_hashes" ("file_upload_id");

            COMMENT ON TABLE "file_upload_line_hashes" IS
                'Line-level dedup fence: one row per line ever committed, across all uploads';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"DROP TABLE "file_upload_line_hashes";"#;
        crate::from_sql(manager, sql).await
    }
}
