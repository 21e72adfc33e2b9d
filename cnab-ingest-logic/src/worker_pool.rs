//! Worker pool (C11) — the hosted loop that consumes the queue, acquires
//! the per-upload lock, and drives the line processor with retry,
//! checkpointing, and dead-lettering.
//!
//! Each worker fiber is an infinite loop (§4.11): dequeue, lock, process,
//! ack. The inner per-batch fan-out over up to `ParallelWorkers` lines uses
//! `buffer_unordered`, the same concurrency-capped-sink shape the teacher's
//! indexer loop uses for its own job stream.

use futures::{stream, StreamExt};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    checkpoint::CheckpointManager,
    line_processor::{LineOutcome, LineProcessor},
    lock::DistributedLock,
    object_store::ObjectStore,
    queue::Queue,
    settings::IngestSettings,
    tracker::UploadTracker,
    transaction_store::TransactionStore,
};
use cnab_ingest_entity::sea_orm_active_enums::FileUploadStatus;

pub struct WorkerPool {
    db: DatabaseConnection,
    tracker: Arc<UploadTracker>,
    queue: Arc<Queue>,
    lock: Arc<DistributedLock>,
    object_store: Arc<ObjectStore>,
    settings: IngestSettings,
}

impl WorkerPool {
    pub fn new(
        db: DatabaseConnection,
        tracker: Arc<UploadTracker>,
        queue: Arc<Queue>,
        lock: Arc<DistributedLock>,
        object_store: Arc<ObjectStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            db,
            tracker,
            queue,
            lock,
            object_store,
            settings,
        }
    }

    /// Spawns `worker_count` fibers and returns once every one of them has
    /// observed `shutdown` and exited. A worker fiber never returns early on
    /// its own; the only way out is the cancellation token.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.queue
            .init_consumer_group(&self.settings.consumer_group)
            .await
            .ok();

        let mut handles = Vec::with_capacity(self.settings.worker_count as usize);
        for worker_index in 0..self.settings.worker_count {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            let consumer_id = format!("worker-{worker_index}");
            handles.push(tokio::spawn(async move {
                pool.worker_loop(consumer_id, shutdown).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, consumer_id: String, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let dequeued = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                result = self.queue.dequeue(&self.settings.consumer_group) => result,
            };

            let message = match dequeued {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(self.settings.dequeue_poll_interval) => continue,
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, consumer_id, "dequeue failed, backing off");
                    tokio::time::sleep(self.settings.dequeue_poll_interval).await;
                    continue;
                }
            };

            let lock_key = format!("upload:processing:{}", message.file_upload_id);
            let upload_id = message.file_upload_id;
            let storage_path = message.storage_path.clone();
            let retry_count = message.retry_count;

            let outcome = self
                .lock
                .with_lock(&lock_key, self.settings.processing_timeout, || {
                    self.process_one(upload_id, storage_path, retry_count)
                })
                .await;

            match outcome {
                Ok(Some(_)) => {
                    if let Err(err) = self.queue.ack(&self.settings.consumer_group, message.message_id).await {
                        tracing::warn!(error = ?err, upload_id = %upload_id, "failed to ack processed message");
                    }
                }
                Ok(None) => {
                    tracing::info!(upload_id = %upload_id, "upload already locked by another worker, skipping");
                }
                Err(err) => {
                    tracing::error!(error = ?err, upload_id = %upload_id, "upload processing failed after all retries");
                    self.queue
                        .move_to_dlq(message.message_id, upload_id, &err.to_string(), retry_count)
                        .await
                        .ok();
                    self.tracker
                        .update_processing_failure(upload_id, &err.to_string(), retry_count)
                        .await
                        .ok();
                }
            }
        }
    }

    /// Runs the full message-level processing with its own bounded retry
    /// budget (`max_message_retries`, exponential backoff), returning `Ok`
    /// once the upload reaches a terminal state or `Err` once retries are
    /// exhausted (the caller dead-letters on `Err`).
    async fn process_one(
        &self,
        upload_id: Uuid,
        storage_path: String,
        mut retry_count: i32,
    ) -> Result<(i64, i64, i64), crate::error::IngestError> {
        let mut attempt = 0u32;
        loop {
            match self
                .process_one_attempt(upload_id, &storage_path, retry_count)
                .await
            {
                Ok(counts) => return Ok(counts),
                Err(err) => {
                    attempt += 1;
                    retry_count += 1;
                    if attempt >= self.settings.max_message_retries {
                        return Err(err);
                    }
                    tracing::warn!(error = ?err, upload_id = %upload_id, attempt, "processOne failed, retrying");
                    let delay = self.settings.base_retry_delay_ms
                        * u64::from(
                            self.settings
                                .retry_backoff_multiplier
                                .saturating_pow(attempt.saturating_sub(1)),
                        );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    async fn process_one_attempt(
        &self,
        upload_id: Uuid,
        storage_path: &str,
        retry_count: i32,
    ) -> Result<(i64, i64, i64), crate::error::IngestError> {
        self.tracker
            .update_processing_status(upload_id, FileUploadStatus::Processing, retry_count)
            .await?;

        let bytes = download_with_retries(&self.object_store, storage_path, 3).await?;

        let upload = self
            .tracker
            .get(upload_id)
            .await?
            .ok_or(crate::error::IngestError::NotFound { upload_id })?;
        let start_from_line = upload.last_checkpoint_line as u64;
        let file_hash = upload.file_hash.clone();

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let lines: Vec<&str> = split_lines(&text);
        let total_line_count = lines.len() as i64;
        if upload.total_line_count.is_none() {
            self.tracker
                .set_total_line_count(upload_id, total_line_count)
                .await?;
        }

        let mut processed = upload.processed_line_count;
        let mut failed = upload.failed_line_count;
        let mut skipped = upload.skipped_line_count;
        let mut highest_contiguous = upload.last_checkpoint_line;

        // Lines already committed before a crash that happened between
        // checkpoints: the loop below re-walks them from `start_from_line`
        // onward, and without this set they'd hit the line-hash dedup check
        // and come back `Skipped` instead of being recognized as the
        // `Success` they already are.
        let committed = TransactionStore::committed_line_indices(&self.db, upload_id).await?;

        let processor = LineProcessor {
            tracker: &self.tracker,
            db: &self.db,
            max_retries: self.settings.max_retry_per_line,
            retry_delay: Duration::from_millis(self.settings.retry_delay_ms),
        };

        let batch_size = self.settings.parallel_workers as usize;
        let mut index = start_from_line as usize;
        while index < lines.len() {
            let previous_total = (processed + failed + skipped) as u64;
            let end = (index + batch_size).min(lines.len());
            let batch: Vec<(usize, &str)> = (index..end).map(|i| (i, lines[i])).collect();

            let results: Vec<(usize, LineOutcome)> = stream::iter(batch)
                .map(|(i, line)| {
                    let processor = &processor;
                    let file_hash = &file_hash;
                    let committed = &committed;
                    async move {
                        if committed.contains(&(i as i64)) {
                            return (i, LineOutcome::Success);
                        }
                        let outcome = processor
                            .process_line(line.as_bytes(), i as u64, upload_id, file_hash)
                            .await;
                        (i, outcome)
                    }
                })
                .buffer_unordered(batch_size.max(1))
                .collect()
                .await;

            for (_, outcome) in &results {
                match outcome {
                    LineOutcome::Success => processed += 1,
                    LineOutcome::Skipped => skipped += 1,
                    LineOutcome::Failed => failed += 1,
                }
            }
            highest_contiguous = end as i64;

            let total_so_far = (processed + failed + skipped) as u64;
            if CheckpointManager::should_save(
                previous_total,
                total_so_far,
                self.settings.checkpoint_interval,
            ) {
                CheckpointManager::save(
                    &self.tracker,
                    upload_id,
                    highest_contiguous,
                    processed,
                    failed,
                    skipped,
                )
                .await;
            }

            index = end;
        }

        self.tracker.commit_line_hashes().await?;
        self.tracker
            .update_processing_result(upload_id, processed, failed, skipped)
            .await?;

        Ok((processed, failed, skipped))
    }

    /// Drives a single upload's `processOne` code path inline, bypassing the
    /// queue dequeue and the distributed lock — the "synchronous"
    /// compatibility mode of §4.10 step 9, reserved for test environments
    /// where a single process is the only writer for a given upload anyway.
    /// Returns the final `(processed, failed, skipped)` counts so the caller
    /// can choose between `200 OK` and `422 Unprocessable Content`.
    pub async fn process_inline(
        &self,
        upload_id: Uuid,
        storage_path: &str,
    ) -> Result<(i64, i64, i64), crate::error::IngestError> {
        self.process_one(upload_id, storage_path.to_string(), 0)
            .await
    }
}

async fn download_with_retries(
    object_store: &ObjectStore,
    storage_path: &str,
    attempts: u32,
) -> Result<Vec<u8>, crate::error::IngestError> {
    let mut last_err = None;
    for attempt in 0..attempts {
        match object_store.get(storage_path).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                tracing::warn!(error = ?err, storage_path, attempt, "blob download failed, retrying");
                last_err = Some(err);
                tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(attempt))).await;
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

/// Splits on `\r\n|\r|\n`; trailing empty lines are ignored, per §6.
///
/// A plain `str::split('\n')` followed by trimming a trailing `\r` does not
/// treat a lone `\r` (not immediately followed by `\n`) as its own line
/// break, so this walks the bytes directly. Safe because `\r`/`\n` are
/// single-byte ASCII and the wire format is byte-positional anyway (§4.2).
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    lines.push(&text[start..]);

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_all_line_ending_styles() {
        assert_eq!(split_lines("a\r\nb\rc\nd"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn trailing_empty_lines_are_dropped() {
        assert_eq!(split_lines("a\nb\n\n\n"), vec!["a", "b"]);
    }

    #[test]
    fn interior_blank_lines_are_kept() {
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
    }
}
