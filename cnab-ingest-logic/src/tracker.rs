//! Upload tracker (C4) — CRUD + invariants over `FileUpload` and
//! `FileUploadLineHash` rows.
//!
//! Every write path here either commits in full or raises; there is no
//! partially-visible state. The buffered [`UploadTracker::record_line_hash`]
//! + [`UploadTracker::commit_line_hashes`] pair lets the line processor (C9)
//! fold hash-recording into the same unit of work as the transaction insert.

use chrono::Utc;
use cnab_ingest_entity::{
    file_upload_line_hashes, file_uploads, sea_orm_active_enums::FileUploadStatus,
};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{IngestError, Result};

/// A durable snapshot of an upload's progress, as exposed to callers outside
/// the tracker (the worker pool, the HTTP surface, the recovery sweeper).
pub type FileUpload = file_uploads::Model;

pub struct UploadTracker {
    db: DatabaseConnection,
    /// Buffer for `record_line_hash` — drained by `commit_line_hashes`.
    ///
    /// A `Mutex<Vec<_>>` rather than a channel: the buffer's lifetime is one
    /// call to `process_batch` on one worker task, never shared across
    /// concurrent line tasks, so plain interior mutability is enough.
    pending_line_hashes: Mutex<Vec<file_upload_line_hashes::ActiveModel>>,
}

impl UploadTracker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            pending_line_hashes: Mutex::new(Vec::new()),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn is_file_unique(&self, file_hash: &str) -> Result<(bool, Option<FileUpload>)> {
        let existing = file_uploads::Entity::find()
            .filter(file_uploads::Column::FileHash.eq(file_hash))
            .one(&self.db)
            .await?;
        Ok((existing.is_none(), existing))
    }

    pub async fn record_pending(
        &self,
        file_name: String,
        file_hash: String,
        file_size: i64,
        storage_path: String,
    ) -> Result<FileUpload> {
        let model = file_uploads::ActiveModel {
            id: Set(Uuid::new_v4()),
            file_name: Set(file_name),
            file_hash: Set(file_hash),
            file_size: Set(file_size),
            storage_path: Set(storage_path),
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
        };

        let inserted = model.insert(&self.db).await.map_err(|err| match err {
            DbErr::Query(ref msg) | DbErr::Exec(ref msg) if is_unique_violation(&msg.to_string()) => {
                IngestError::internal(anyhow::anyhow!("file hash race on insert: {err}"))
            }
            other => IngestError::from(other),
        })?;
        Ok(inserted)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FileUpload>> {
        Ok(file_uploads::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn set_total_line_count(&self, id: Uuid, total: i64) -> Result<()> {
        let mut active = fetch_active(&self.db, id).await?;
        active.total_line_count = Set(Some(total));
        active.update(&self.db).await?;
        Ok(())
    }

    /// Stamps `processing_started_at` the first time the status becomes
    /// `Processing`, per §4.4.
    pub async fn update_processing_status(
        &self,
        id: Uuid,
        status: FileUploadStatus,
        retry_count: i32,
    ) -> Result<()> {
        let current = self
            .get(id)
            .await?
            .ok_or(IngestError::NotFound { upload_id: id })?;

        let mut active = file_uploads::ActiveModel {
            id: Set(id),
            status: Set(status),
            retry_count: Set(retry_count),
            ..Default::default()
        };
        if matches!(status, FileUploadStatus::Processing) && current.processing_started_at.is_none()
        {
            active.processing_started_at = Set(Some(Utc::now().into()));
        }
        active.update(&self.db).await?;
        Ok(())
    }

    /// Monotonic: `last_line` must never regress. Callers (the checkpoint
    /// manager) are expected to only call this with increasing indices, but
    /// the invariant is enforced here too so a racing retry can't regress it.
    pub async fn update_checkpoint(
        &self,
        id: Uuid,
        last_line: i64,
        processed: i64,
        failed: i64,
        skipped: i64,
    ) -> Result<()> {
        let current = self
            .get(id)
            .await?
            .ok_or(IngestError::NotFound { upload_id: id })?;
        if last_line <= current.last_checkpoint_line {
            return Ok(());
        }

        let active = file_uploads::ActiveModel {
            id: Set(id),
            last_checkpoint_line: Set(last_line),
            processed_line_count: Set(processed),
            failed_line_count: Set(failed),
            skipped_line_count: Set(skipped),
            last_checkpoint_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };
        active.update(&self.db).await?;
        Ok(())
    }

    /// Final terminal write. Computes status from counts: `Success` when
    /// fully accounted for with no failures, `PartiallyCompleted` when fully
    /// accounted for with some failures, otherwise the upload is left as-is
    /// (still `Processing`/`Pending` — the caller hasn't finished the file).
    pub async fn update_processing_result(
        &self,
        id: Uuid,
        processed: i64,
        failed: i64,
        skipped: i64,
    ) -> Result<()> {
        let current = self
            .get(id)
            .await?
            .ok_or(IngestError::NotFound { upload_id: id })?;
        let total = current.total_line_count.unwrap_or(0);
        let accounted = processed + failed + skipped;

        let mut active = file_uploads::ActiveModel {
            id: Set(id),
            processed_line_count: Set(processed),
            failed_line_count: Set(failed),
            skipped_line_count: Set(skipped),
            ..Default::default()
        };

        if accounted >= total {
            active.status = Set(if failed == 0 {
                FileUploadStatus::Success
            } else {
                FileUploadStatus::PartiallyCompleted
            });
            active.processing_completed_at = Set(Some(Utc::now().into()));
        }

        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn update_processing_failure(
        &self,
        id: Uuid,
        error: &str,
        retry_count: i32,
    ) -> Result<()> {
        let active = file_uploads::ActiveModel {
            id: Set(id),
            status: Set(FileUploadStatus::Failed),
            retry_count: Set(retry_count),
            error_message: Set(Some(error.to_string())),
            processing_completed_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn is_line_unique(&self, line_hash: &str) -> Result<bool> {
        let existing = file_upload_line_hashes::Entity::find()
            .filter(file_upload_line_hashes::Column::LineHash.eq(line_hash))
            .one(&self.db)
            .await?;
        Ok(existing.is_none())
    }

    /// Buffers a line-hash row for the next `commit_line_hashes` call. Does
    /// not touch the database — see module docs.
    pub fn record_line_hash(&self, file_upload_id: Uuid, line_hash: String, line_content: String) {
        let active = file_upload_line_hashes::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            file_upload_id: Set(file_upload_id),
            line_hash: Set(line_hash),
            line_content: Set(line_content),
            processed_at: Set(Utc::now().into()),
        };
        self.pending_line_hashes
            .lock()
            .expect("pending_line_hashes mutex poisoned")
            .push(active);
    }

    /// Stages the same row inside an in-flight unit of work, for C9's
    /// per-line atomic commit, without touching the shared buffer.
    pub async fn insert_line_hash_in_unit<C: ConnectionTrait>(
        conn: &C,
        file_upload_id: Uuid,
        line_hash: String,
        line_content: String,
    ) -> Result<()> {
        let active = file_upload_line_hashes::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            file_upload_id: Set(file_upload_id),
            line_hash: Set(line_hash),
            line_content: Set(line_content),
            processed_at: Set(Utc::now().into()),
        };
        active.insert(conn).await.map_err(|err| {
            if is_unique_violation(&err.to_string()) {
                IngestError::TransientStateError(anyhow::anyhow!("duplicate line hash: {err}"))
            } else {
                IngestError::from(err)
            }
        })?;
        Ok(())
    }

    /// Idempotent bulk insert of everything buffered via `record_line_hash`,
    /// using "insert many, on conflict do nothing" per §9's preference.
    pub async fn commit_line_hashes(&self) -> Result<()> {
        let batch = {
            let mut guard = self
                .pending_line_hashes
                .lock()
                .expect("pending_line_hashes mutex poisoned");
            std::mem::take(&mut *guard)
        };
        if batch.is_empty() {
            return Ok(());
        }

        file_upload_line_hashes::Entity::insert_many(batch)
            .on_conflict(
                OnConflict::column(file_upload_line_hashes::Column::LineHash)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(&self.db)
            .await
            .map(|_| ())
            .or_else(|err| match err {
                sea_orm::error::DbErr::RecordNotInserted => Ok(()),
                other => Err(IngestError::from(other)),
            })
    }

    /// `§4.4`: uploads in `Processing` whose `processing_started_at` **and**
    /// whose `last_checkpoint_at` (or its absence) are both older than the
    /// timeout — the safer of the two predicates the source carried.
    pub async fn find_incomplete_uploads(&self, timeout_minutes: i64) -> Result<Vec<FileUpload>> {
        let cutoff = Utc::now() - chrono::Duration::minutes(timeout_minutes);
        let candidates = file_uploads::Entity::find()
            .filter(file_uploads::Column::Status.eq(FileUploadStatus::Processing))
            .filter(file_uploads::Column::ProcessingStartedAt.lt(cutoff))
            .order_by_asc(file_uploads::Column::ProcessingStartedAt)
            .all(&self.db)
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|u| match u.last_checkpoint_at {
                None => true,
                Some(checkpoint_at) => checkpoint_at < cutoff,
            })
            .collect())
    }

    /// Paged listing for the HTTP surface's `GET /transactions/uploads`,
    /// newest first, optionally narrowed to one status.
    pub async fn list(
        &self,
        page: u64,
        page_size: u64,
        status: Option<FileUploadStatus>,
    ) -> Result<(Vec<FileUpload>, u64)> {
        let mut query = file_uploads::Entity::find().order_by_desc(file_uploads::Column::UploadedAt);
        if let Some(status) = status {
            query = query.filter(file_uploads::Column::Status.eq(status));
        }

        let paginator = query.paginate(&self.db, page_size.max(1));
        let total_items = paginator.num_items().await?;
        let items = paginator.fetch_page(page).await?;
        Ok((items, total_items))
    }

    pub async fn is_upload_incomplete(&self, id: Uuid) -> Result<bool> {
        let upload = self
            .get(id)
            .await?
            .ok_or(IngestError::NotFound { upload_id: id })?;
        Ok(is_incomplete(&upload))
    }

    /// Removes a `FileUpload` row outright. Used only by intake's rollback
    /// when `enqueue` fails after the row was already inserted — nothing
    /// downstream has observed the row at that point, so a hard delete (not
    /// a status transition) is correct.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        file_uploads::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }
}

pub fn is_incomplete(upload: &FileUpload) -> bool {
    if matches!(
        upload.status,
        FileUploadStatus::Pending | FileUploadStatus::Processing
    ) {
        return true;
    }
    match upload.total_line_count {
        Some(total) if total > 0 => {
            upload.processed_line_count + upload.failed_line_count + upload.skipped_line_count
                < total
        }
        _ => false,
    }
}

async fn fetch_active(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<file_uploads::ActiveModel> {
    let model = file_uploads::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(IngestError::NotFound { upload_id: id })?;
    Ok(model.into())
}

fn is_unique_violation(message: &str) -> bool {
    message.contains("duplicate key") || message.contains("UNIQUE constraint")
}
