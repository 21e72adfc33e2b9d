//! Line processor (C9) — dedup-check, parse, and atomic commit of a single
//! CNAB line.
//!
//! The pre-check (`is_line_unique`) avoids most wasted work under normal
//! operation; the unique-constraint backstop on the `line_hash`/
//! `idempotency_key` columns is what actually guarantees exactly-once
//! semantics when two workers race over overlapping lines after a recovery
//! re-enqueue (§4.9).

use sea_orm::{DatabaseConnection, TransactionTrait};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    error::IngestError,
    hash,
    parser::{parse_line, ParseError},
    tracker::UploadTracker,
    transaction_store::{NewTransaction, TransactionStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Success,
    Skipped,
    Failed,
}

pub struct LineProcessor<'a> {
    pub tracker: &'a UploadTracker,
    pub db: &'a DatabaseConnection,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl<'a> LineProcessor<'a> {
    pub async fn process_line(
        &self,
        content: &[u8],
        line_index: u64,
        upload_id: Uuid,
        file_hash: &str,
    ) -> LineOutcome {
        let line_hash = hash::line_hash(content);

        match self.tracker.is_line_unique(&line_hash).await {
            Ok(true) => {}
            Ok(false) => return LineOutcome::Skipped,
            Err(err) => {
                tracing::warn!(error = ?err, line_index, "dedup pre-check failed, proceeding to parse+insert attempt");
            }
        }

        let parsed = match parse_line(content, line_index) {
            Ok(parsed) => parsed,
            Err(ParseError { reason, .. }) => {
                tracing::warn!(line_index, reason, "line failed to parse");
                return LineOutcome::Failed;
            }
        };

        let new_tx = NewTransaction::from_parsed(parsed, upload_id, file_hash, line_index);
        let line_content = String::from_utf8_lossy(content).into_owned();

        let mut attempt = 0u32;
        loop {
            match self
                .commit_line(upload_id, &line_hash, &line_content, new_tx.clone())
                .await
            {
                Ok(()) => return LineOutcome::Success,
                Err(CommitOutcome::Duplicate) => return LineOutcome::Skipped,
                Err(CommitOutcome::Retryable(err)) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        tracing::warn!(error = ?err, line_index, attempt, "line processing exhausted retries");
                        return LineOutcome::Failed;
                    }
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }

    /// Opens a unit of work, stages the transaction insert and the
    /// line-hash record, and commits both atomically.
    async fn commit_line(
        &self,
        upload_id: Uuid,
        line_hash: &str,
        line_content: &str,
        tx: NewTransaction,
    ) -> Result<(), CommitOutcome> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|err| CommitOutcome::Retryable(IngestError::from(err)))?;

        TransactionStore::add_to_unit(&txn, tx)
            .await
            .map_err(|err| classify(err))?;

        UploadTracker::insert_line_hash_in_unit(
            &txn,
            upload_id,
            line_hash.to_string(),
            line_content.to_string(),
        )
        .await
        .map_err(|err| classify(err))?;

        txn.commit()
            .await
            .map_err(|err| CommitOutcome::Retryable(IngestError::from(err)))?;

        Ok(())
    }
}

enum CommitOutcome {
    Duplicate,
    Retryable(IngestError),
}

fn classify(err: IngestError) -> CommitOutcome {
    let message = err.to_string();
    if message.contains("duplicate") || message.contains("UNIQUE constraint") {
        CommitOutcome::Duplicate
    } else {
        CommitOutcome::Retryable(err)
    }
}
