//! Upload intake (C10) — the synchronous path invoked by the upload
//! endpoint: validate, fingerprint, persist the blob, enqueue.
//!
//! Steps short-circuit on the first failure, per §4.10. `enqueue` is the
//! last step, so if it fails the blob and the `Pending` row are already
//! there — and the recovery sweeper only ever looks at `Processing`
//! uploads, so a stuck `Pending` row would never be picked back up. Intake
//! compensates for this itself: an `enqueue` failure deletes the row and
//! the blob it put before surfacing `QueueFailure`, so callers never see a
//! row that nothing will ever process.

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::{
    error::{IngestError, Result},
    hash,
    object_store::ObjectStore,
    queue::Queue,
    tracker::{FileUpload, UploadTracker},
};

pub struct UploadIntakeSettings {
    pub max_file_size_bytes: u64,
    pub allowed_extension: String,
}

pub struct UploadIntake<'a> {
    pub tracker: &'a UploadTracker,
    pub object_store: &'a ObjectStore,
    pub queue: &'a Queue,
    pub settings: &'a UploadIntakeSettings,
}

pub enum IntakeOutcome {
    Accepted { upload: FileUpload },
    Duplicate { existing_upload_id: Uuid },
}

impl<'a> UploadIntake<'a> {
    pub async fn ingest(&self, file_name: &str, bytes: Vec<u8>) -> Result<IntakeOutcome> {
        if bytes.is_empty() {
            return Err(IngestError::InvalidRequest {
                reason: "uploaded file is empty".to_string(),
            });
        }
        if bytes.len() as u64 > self.settings.max_file_size_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: bytes.len() as u64,
                limit: self.settings.max_file_size_bytes,
            });
        }
        if !file_name
            .to_lowercase()
            .ends_with(&self.settings.allowed_extension.to_lowercase())
        {
            return Err(IngestError::UnsupportedMediaType {
                reason: format!(
                    "unsupported file extension, expected {}",
                    self.settings.allowed_extension
                ),
            });
        }

        let file_hash = hash::file_hash(&bytes);

        let (unique, existing) = self.tracker.is_file_unique(&file_hash).await?;
        if !unique {
            let existing_upload_id = existing
                .expect("is_file_unique returned false without an existing upload")
                .id;
            return Ok(IntakeOutcome::Duplicate { existing_upload_id });
        }

        let storage_path = generate_storage_path();
        self.object_store.put(&storage_path, bytes.clone()).await?;

        let upload = self
            .tracker
            .record_pending(
                file_name.to_string(),
                file_hash,
                bytes.len() as i64,
                storage_path.clone(),
            )
            .await?;

        if let Err(err) = self.queue.enqueue(upload.id, storage_path.clone()).await {
            tracing::warn!(
                upload_id = %upload.id,
                error = ?err,
                "enqueue failed after blob and pending row were persisted, rolling back"
            );
            if let Err(delete_err) = self.tracker.delete(upload.id).await {
                tracing::error!(upload_id = %upload.id, error = ?delete_err, "failed to delete orphaned pending row");
            }
            if let Err(delete_err) = self.object_store.delete(&storage_path).await {
                tracing::error!(upload_id = %upload.id, error = ?delete_err, "failed to delete orphaned blob");
            }
            return Err(err);
        }

        Ok(IntakeOutcome::Accepted { upload })
    }
}

/// `cnab-YYYYMMDD-HHMMSS-<rand>.txt`, UTC, per §4.10 step 5.
fn generate_storage_path() -> String {
    let now = Utc::now();
    let rand_suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!(
        "cnab-{}-{:06}.txt",
        now.format("%Y%m%d-%H%M%S"),
        rand_suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_has_expected_shape() {
        let path = generate_storage_path();
        assert!(path.starts_with("cnab-"));
        assert!(path.ends_with(".txt"));
        // cnab- + 8 date digits + - + 6 time digits + - + 6 rand digits + .txt
        assert_eq!(path.len(), "cnab-".len() + 8 + 1 + 6 + 1 + 6 + ".txt".len());
    }
}
