use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TYPE "file_upload_status" AS ENUM (
                'pending', 'processing', 'success', 'failed', 'duplicate', 'partially_completed'
            );

            CREATE TABLE "file_uploads" (
                "id" uuid PRIMARY KEY,
                "file_name" text NOT NULL,
                "file_hash" text NOT NULL,
                "file_size" bigint NOT NULL,
                "storage_path" text NOT NULL,
                "status" file_upload_status NOT NULL DEFAULT 'pending',
                "total_line_count" bigint,
                "processed_line_count" bigint NOT NULL DEFAULT 0,
                "failed_line_count" bigint NOT NULL DEFAULT 0,
                "skipped_line_count" bigint NOT NULL DEFAULT 0,
                "last_checkpoint_line" bigint NOT NULL DEFAULT 0,
                "retry_count" integer NOT NULL DEFAULT 0,
                "error_message" text,
                "uploaded_at" timestamptz NOT NULL DEFAULT now(),
                "processing_started_at" timestamptz,
                "processing_completed_at" timestamptz,
                "last_checkpoint_at" timestamptz
            );

            CREATE UNIQUE INDEX "file_uploads_file_hash_key" ON "file_uploads" ("file_hash");
            CREATE INDEX "file_uploads_status_idx" ON "file_uploads" ("status");

            COMMENT ON TABLE "file_uploads" IS 'One row per uploaded CNAB file and its processing progress';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "file_uploads";
            DROP TYPE "file_upload_status";
        "#;
        crate::from_sql(manager, sql).await
    }
}
