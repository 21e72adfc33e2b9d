use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "distributed_locks" (
                "lock_key" text PRIMARY KEY,
                "owner" text NOT NULL,
                "expires_at" timestamptz NOT NULL
            );

            COMMENT ON TABLE "distributed_locks" IS
                'TTL-based compare-and-swap locks, one row per held lock key';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"DROP TABLE "distributed_locks";"#;
        crate::from_sql(manager, sql).await
    }
}
