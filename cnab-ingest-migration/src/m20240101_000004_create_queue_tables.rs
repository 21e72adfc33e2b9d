use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TYPE "queue_message_status" AS ENUM ('pending', 'processed');

            CREATE TABLE "queue_messages" (
                "id" uuid PRIMARY KEY,
                "consumer_group" text NOT NULL,
                "file_upload_id" uuid NOT NULL REFERENCES "file_uploads" ("id"),
                "storage_path" text NOT NULL,
                "status" queue_message_status NOT NULL DEFAULT 'pending',
                "retry_count" integer NOT NULL DEFAULT 0,
                "enqueued_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE INDEX "queue_messages_dequeue_idx"
                ON "queue_messages" ("consumer_group", "enqueued_at")
                WHERE "status" = 'pending';

            CREATE TABLE "queue_dead_letters" (
                "id" bigserial PRIMARY KEY,
                "message_id" uuid NOT NULL,
                "file_upload_id" uuid NOT NULL REFERENCES "file_uploads" ("id"),
                "reason" text NOT NULL,
                "retry_count" integer NOT NULL,
                "last_attempt_at" timestamptz NOT NULL DEFAULT now()
            );

            COMMENT ON TABLE "queue_messages" IS 'Durable stream of pending upload-processing jobs';
            COMMENT ON TABLE "queue_dead_letters" IS 'Messages that exhausted their retry budget';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "queue_dead_letters";
            DROP TABLE "queue_messages";
            DROP TYPE "queue_message_status";
        "#;
        crate::from_sql(manager, sql).await
    }
}
