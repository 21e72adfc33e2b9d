//! Transaction store (C5) — atomic insert of a parsed record, keyed by its
//! idempotency key.
//!
//! Balance and query read paths are explicitly out of scope of the core; this
//! module only ever writes.

use chrono::Utc;
use cnab_ingest_entity::transactions;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QuerySelect,
};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{error::IngestError, parser::ParsedTransaction};

/// A parsed transaction with its owning upload and idempotency key attached,
/// ready to be staged into a unit of work by [`add_to_unit`].
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub file_upload_id: Uuid,
    pub idempotency_key: String,
    pub line_index: i64,
    pub parsed: ParsedTransaction,
}

impl NewTransaction {
    pub fn from_parsed(
        parsed: ParsedTransaction,
        file_upload_id: Uuid,
        file_hash: &str,
        line_index: u64,
    ) -> Self {
        Self {
            file_upload_id,
            idempotency_key: format!("{file_hash}:{line_index}"),
            line_index: line_index as i64,
            parsed,
        }
    }
}

#[derive(Clone)]
pub struct TransactionStore {
    db: DatabaseConnection,
}

impl TransactionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Stages an insert inside the caller's unit of work. Fails with
    /// [`IngestError::TransientStateError`] (translated from the
    /// underlying unique-key violation) if `idempotency_key` already exists
    /// — the line processor is expected to downgrade that specific case to
    /// `Skipped`.
    pub async fn add_to_unit<C: ConnectionTrait>(
        conn: &C,
        tx: NewTransaction,
    ) -> Result<(), IngestError> {
        let active = transactions::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            file_upload_id: Set(tx.file_upload_id),
            idempotency_key: Set(tx.idempotency_key),
            line_index: Set(tx.line_index),
            bank_code: Set(tx.parsed.bank_code),
            cpf_cnpj: Set(tx.parsed.cpf_cnpj),
            nature_code: Set(tx.parsed.nature_code as i16),
            amount_cents: Set(tx.parsed.amount_cents),
            card: Set(tx.parsed.card),
            store_owner: Set(tx.parsed.store_owner),
            store_name: Set(tx.parsed.store_name),
            transaction_date: Set(tx.parsed.transaction_date),
            transaction_time: Set(tx.parsed.transaction_time),
            created_at: Set(Utc::now().into()),
        };

        active.insert(conn).await.map_err(|err| {
            if is_unique_violation(&err.to_string()) {
                IngestError::TransientStateError(anyhow::anyhow!(
                    "duplicate idempotency key: {err}"
                ))
            } else {
                IngestError::from(err)
            }
        })?;
        Ok(())
    }

    /// Administrative truncation — drives `DELETE /transactions`.
    pub async fn clear_all(&self) -> Result<(), IngestError> {
        transactions::Entity::delete_many().exec(&self.db).await?;
        Ok(())
    }

    /// The set of `line_index` values already committed for one upload.
    ///
    /// Resuming a crashed batch re-walks every line from the last
    /// checkpoint onward, including ones committed before the crash; this
    /// lets the worker pool recognize those as already-processed instead of
    /// re-deriving their outcome from the line-hash dedup check, which would
    /// misclassify them as `Skipped`.
    pub async fn committed_line_indices<C: ConnectionTrait>(
        conn: &C,
        file_upload_id: Uuid,
    ) -> Result<HashSet<i64>, IngestError> {
        let indices: Vec<i64> = transactions::Entity::find()
            .filter(transactions::Column::FileUploadId.eq(file_upload_id))
            .select_only()
            .column(transactions::Column::LineIndex)
            .into_tuple()
            .all(conn)
            .await?;
        Ok(indices.into_iter().collect())
    }
}

pub fn is_unique_violation(message: &str) -> bool {
    message.contains("duplicate key") || message.contains("UNIQUE constraint")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use blockscout_service_launcher::test_database::TestDbGuard;
    use migration::Migrator;
    use sea_orm::TransactionTrait;

    fn sample_line() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"1");
        bytes.extend_from_slice(b"20190115");
        bytes.extend_from_slice(b"0000010000");
        bytes.extend_from_slice(b"11111111111");
        bytes.extend_from_slice(b"123456789012");
        bytes.extend_from_slice(b"120000");
        bytes.extend_from_slice(b"STORE OWNER   ");
        bytes.extend_from_slice(b"STORE NAME        ");
        bytes
    }

    #[tokio::test]
    async fn rejects_duplicate_idempotency_key() {
        let db = TestDbGuard::new::<Migrator>("cnab_ingest_transaction_store").await;
        let conn = db.client();
        let upload_id = Uuid::new_v4();

        // Need a parent file_uploads row to satisfy the foreign key.
        seed_upload(&conn, upload_id).await;

        let parsed = parse_line(&sample_line(), 0).unwrap();
        let tx = NewTransaction::from_parsed(parsed.clone(), upload_id, "file-hash", 0);

        let txn = conn.begin().await.unwrap();
        TransactionStore::add_to_unit(&txn, tx).await.unwrap();
        txn.commit().await.unwrap();

        let dup = NewTransaction::from_parsed(parsed, upload_id, "file-hash", 0);
        let txn2 = conn.begin().await.unwrap();
        let result = TransactionStore::add_to_unit(&txn2, dup).await;
        assert!(result.is_err());
    }

    async fn seed_upload(conn: &sea_orm::DatabaseConnection, id: Uuid) {
        use cnab_ingest_entity::{file_uploads, sea_orm_active_enums::FileUploadStatus};
        file_uploads::ActiveModel {
            id: Set(id),
            file_name: Set("f.txt".into()),
            file_hash: Set(format!("hash-{id}")),
            file_size: Set(10),
            storage_path: Set("path".into()),
            status: Set(FileUploadStatus::Pending),
            total_line_count: Set(None),
            processed_line_count: Set(0),
            failed_line_count: Set(0),
            skipped_line_count: Set(0),
            last_checkpoint_line: Set(0),
            retry_count: Set(0),
            error_message: Set(None),
            uploaded_at: Set(Utc::now().into()),
            processing_started_at: Set(None),
            processing_completed_at: Set(None),
            last_checkpoint_at: Set(None),
        }
        .insert(conn)
        .await
        .unwrap();
    }
}
