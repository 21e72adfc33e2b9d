//! Recovery sweeper (C12) — a background timer that re-publishes messages
//! for uploads whose progress has stalled.
//!
//! The sweeper never mutates upload state; it only re-enqueues. Every state
//! transition remains the exclusive province of the worker pool (C11), per
//! §4.12's guarantee. [`RecoverySweeper::sweep`] is also the engine behind
//! the `resume-all` HTTP endpoint, which wants the per-upload outcome rather
//! than the aggregate log lines the background timer is content with.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{IngestError, Result},
    lock::DistributedLock,
    queue::Queue,
    tracker::UploadTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Enqueued,
    SkippedNoStoragePath,
    SkippedLocked,
    SkippedRecentCheckpoint,
}

pub struct RecoverySweeper {
    tracker: Arc<UploadTracker>,
    queue: Arc<Queue>,
    lock: Arc<DistributedLock>,
    check_interval_minutes: u64,
    stuck_upload_timeout_minutes: i64,
}

impl RecoverySweeper {
    pub fn new(
        tracker: Arc<UploadTracker>,
        queue: Arc<Queue>,
        lock: Arc<DistributedLock>,
        check_interval_minutes: u64,
        stuck_upload_timeout_minutes: i64,
    ) -> Self {
        Self {
            tracker,
            queue,
            lock,
            check_interval_minutes,
            stuck_upload_timeout_minutes,
        }
    }

    /// Runs until `shutdown` is signalled. A tick's own failure is logged
    /// and swallowed — the sweeper is best-effort and must not bring the
    /// process down; it gets another chance at the next interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.check_interval_minutes * 60);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            match self.sweep(self.stuck_upload_timeout_minutes).await {
                Ok(outcomes) => {
                    let enqueued = outcomes
                        .iter()
                        .filter(|(_, outcome)| *outcome == SweepOutcome::Enqueued)
                        .count();
                    if enqueued > 0 {
                        tracing::info!(enqueued, total = outcomes.len(), "recovery sweep complete");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "recovery sweep tick failed, will retry next interval");
                }
            }
        }
    }

    /// One sweep pass against `timeout_minutes`, per §4.12. Used both by the
    /// background timer and the `resume-all` HTTP endpoint.
    pub async fn sweep(&self, timeout_minutes: i64) -> Result<Vec<(Uuid, SweepOutcome)>> {
        let candidates = self.tracker.find_incomplete_uploads(timeout_minutes).await?;
        let half_timeout = chrono::Duration::minutes(timeout_minutes) / 2;
        let now = Utc::now();

        let mut outcomes = Vec::with_capacity(candidates.len());
        for upload in candidates {
            if upload.storage_path.is_empty() {
                outcomes.push((upload.id, SweepOutcome::SkippedNoStoragePath));
                continue;
            }

            let lock_key = format!("upload:processing:{}", upload.id);
            if self.lock.exists(&lock_key).await? {
                outcomes.push((upload.id, SweepOutcome::SkippedLocked));
                continue;
            }

            if let Some(last_checkpoint_at) = upload.last_checkpoint_at {
                let last_checkpoint_at: chrono::DateTime<Utc> = last_checkpoint_at.into();
                if now - last_checkpoint_at < half_timeout {
                    outcomes.push((upload.id, SweepOutcome::SkippedRecentCheckpoint));
                    continue;
                }
            }

            self.queue
                .enqueue_with_retry_count(upload.id, upload.storage_path.clone(), upload.retry_count)
                .await?;
            tracing::info!(upload_id = %upload.id, "recovery sweeper re-enqueued stuck upload");
            outcomes.push((upload.id, SweepOutcome::Enqueued));
        }

        Ok(outcomes)
    }
}

/// Re-enqueues a single upload on deliberate client request
/// (`POST /transactions/uploads/{U}/resume`). Unlike [`RecoverySweeper::sweep`],
/// this is an explicit action: it does not defer to an in-progress lock or a
/// recent checkpoint, only to the upload's own recorded state.
pub async fn resume_upload(tracker: &UploadTracker, queue: &Queue, upload_id: Uuid) -> Result<()> {
    let upload = tracker
        .get(upload_id)
        .await?
        .ok_or(IngestError::NotFound { upload_id })?;

    if !crate::tracker::is_incomplete(&upload) {
        return Err(IngestError::InvalidRequest {
            reason: format!("upload {upload_id} is not incomplete"),
        });
    }
    if upload.storage_path.is_empty() {
        return Err(IngestError::InvalidRequest {
            reason: format!("upload {upload_id} has no recorded storage path"),
        });
    }

    queue
        .enqueue_with_retry_count(upload.id, upload.storage_path.clone(), upload.retry_count)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockscout_service_launcher::test_database::TestDbGuard;
    use cnab_ingest_entity::{file_uploads, sea_orm_active_enums::FileUploadStatus};
    use migration::Migrator;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};

    async fn seed_stuck_upload(db: &sea_orm::DatabaseConnection, storage_path: &str) -> Uuid {
        let id = Uuid::new_v4();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        file_uploads::ActiveModel {
            id: Set(id),
            file_name: Set("f.txt".into()),
            file_hash: Set(format!("hash-{id}")),
            file_size: Set(1),
            storage_path: Set(storage_path.to_string()),
            status: Set(FileUploadStatus::Processing),
            total_line_count: Set(Some(100)),
            processed_line_count: Set(10),
            failed_line_count: Set(0),
            skipped_line_count: Set(0),
            last_checkpoint_line: Set(10),
            retry_count: Set(0),
            error_message: Set(None),
            uploaded_at: Set(long_ago.into()),
            processing_started_at: Set(Some(long_ago.into())),
            processing_completed_at: Set(None),
            last_checkpoint_at: Set(Some(long_ago.into())),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn stuck_upload_with_no_lock_is_reenqueued() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = Arc::new(UploadTracker::new(db.clone()));
        let queue = Arc::new(Queue::new(db.clone()));
        let lock = Arc::new(DistributedLock::new(db.clone()));

        let upload_id = seed_stuck_upload(&db, "storage/path").await;

        let sweeper = RecoverySweeper::new(tracker, queue.clone(), lock, 30, 30);
        let outcomes = sweeper.sweep(30).await.unwrap();
        assert_eq!(outcomes, vec![(upload_id, SweepOutcome::Enqueued)]);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn locked_upload_is_skipped() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery_locked").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = Arc::new(UploadTracker::new(db.clone()));
        let queue = Arc::new(Queue::new(db.clone()));
        let lock = Arc::new(DistributedLock::new(db.clone()));

        let upload_id = seed_stuck_upload(&db, "storage/path").await;
        lock.acquire(
            &format!("upload:processing:{upload_id}"),
            "some-worker",
            std::time::Duration::from_secs(3600),
        )
        .await
        .unwrap();

        let sweeper = RecoverySweeper::new(tracker, queue.clone(), lock, 30, 30);
        let outcomes = sweeper.sweep(30).await.unwrap();
        assert_eq!(outcomes, vec![(upload_id, SweepOutcome::SkippedLocked)]);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn upload_with_no_storage_path_is_skipped() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery_nostorage").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = Arc::new(UploadTracker::new(db.clone()));
        let queue = Arc::new(Queue::new(db.clone()));
        let lock = Arc::new(DistributedLock::new(db.clone()));

        let upload_id = seed_stuck_upload(&db, "").await;

        let sweeper = RecoverySweeper::new(tracker, queue.clone(), lock, 30, 30);
        let outcomes = sweeper.sweep(30).await.unwrap();
        assert_eq!(
            outcomes,
            vec![(upload_id, SweepOutcome::SkippedNoStoragePath)]
        );
    }

    #[tokio::test]
    async fn resume_rejects_upload_with_no_storage_path() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery_resume_nostorage").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = UploadTracker::new(db.clone());
        let queue = Queue::new(db.clone());

        let upload_id = seed_stuck_upload(&db, "").await;
        let result = resume_upload(&tracker, &queue, upload_id).await;
        assert!(matches!(result, Err(IngestError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn resume_rejects_complete_upload() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery_resume_complete").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = UploadTracker::new(db.clone());
        let queue = Queue::new(db.clone());

        let upload = tracker
            .record_pending("f.txt".into(), "hash-complete".into(), 10, "path".into())
            .await
            .unwrap();
        tracker.set_total_line_count(upload.id, 1).await.unwrap();
        tracker
            .update_processing_result(upload.id, 1, 0, 0)
            .await
            .unwrap();

        let result = resume_upload(&tracker, &queue, upload.id).await;
        assert!(matches!(result, Err(IngestError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn resume_enqueues_incomplete_upload() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_recovery_resume_ok").await;
        let db = db_guard.client().as_ref().clone();
        let tracker = UploadTracker::new(db.clone());
        let queue = Queue::new(db.clone());

        let upload_id = seed_stuck_upload(&db, "storage/path").await;
        resume_upload(&tracker, &queue, upload_id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }
}
