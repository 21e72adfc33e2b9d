pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{Statement, TransactionTrait};

mod m20240101_000001_create_file_uploads;
mod m20240101_000002_create_file_upload_line_hashes;
mod m20240101_000003_create_transactions;
mod m20240101_000004_create_queue_tables;
mod m20240101_000005_create_distributed_locks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_file_uploads::Migration),
            Box::new(m20240101_000002_create_file_upload_line_hashes::Migration),
            Box::new(m20240101_000003_create_transactions::Migration),
            Box::new(m20240101_000004_create_queue_tables::Migration),
            Box::new(m20240101_000005_create_distributed_locks::Migration),
        ]
    }
}

pub async fn from_sql(manager: &SchemaManager<'_>, content: &str) -> Result<(), DbErr> {
    let stmnts: Vec<&str> = content.split(';').filter(|s| !s.trim().is_empty()).collect();
    let txn = manager.get_connection().begin().await?;
    for st in stmnts.into_iter() {
        txn.execute(Statement::from_string(
            manager.get_database_backend(),
            st.to_string(),
        ))
        .await
        .map_err(|e| DbErr::Migration(format!("{e}\nQuery: {st}")))?;
    }
    txn.commit().await
}
