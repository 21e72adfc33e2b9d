use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;

/// Tunables for the per-line / per-message processing pipeline (C8, C9, C11, C12).
///
/// Mirrors `§6 Configuration` of the specification: every field has the
/// documented default and every duration is expressed in seconds on the
/// wire, following the teacher's `serde_with::DurationSeconds` convention.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    pub parallel_workers: u32,
    pub checkpoint_interval: u64,
    pub max_retry_per_line: u32,
    pub retry_delay_ms: u64,
    pub recovery_check_interval_minutes: u64,
    pub stuck_upload_timeout_minutes: u64,
    pub max_file_size_bytes: u64,
    pub allowed_extension: String,

    pub worker_count: u32,
    pub consumer_group: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub processing_timeout: Duration,
    pub max_message_retries: u32,
    pub base_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub dequeue_poll_interval: Duration,

    /// `§4.10` step 9: drive the worker's `processOne` code path inline from
    /// the upload request instead of handing it to the background pool.
    /// Reserved for test environments — `false` in production deployments.
    pub synchronous_processing: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            checkpoint_interval: 1000,
            max_retry_per_line: 3,
            retry_delay_ms: 500,
            recovery_check_interval_minutes: 5,
            stuck_upload_timeout_minutes: 30,
            max_file_size_bytes: 1024 * 1024 * 1024,
            allowed_extension: ".txt".to_string(),

            worker_count: 2,
            consumer_group: "cnab-ingest-workers".to_string(),
            processing_timeout: Duration::from_secs(30 * 60),
            max_message_retries: 3,
            base_retry_delay_ms: 1000,
            retry_backoff_multiplier: 2,
            dequeue_poll_interval: Duration::from_secs(1),
            synchronous_processing: false,
        }
    }
}

impl IngestSettings {
    /// `§6`: `ParallelWorkers` is bound to `1..=64`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=64).contains(&self.parallel_workers) {
            anyhow::bail!(
                "parallel_workers must be within 1..=64, got {}",
                self.parallel_workers
            );
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("checkpoint_interval must be greater than zero");
        }
        Ok(())
    }
}
