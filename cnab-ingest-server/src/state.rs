use std::sync::Arc;

use cnab_ingest_logic::{
    intake::UploadIntakeSettings, DistributedLock, IngestSettings, ObjectStore, Queue,
    RecoverySweeper, UploadTracker, WorkerPool,
};

/// Shared, `Arc`-wrapped handles handed to every request and every
/// background task (C11, C12) alike.
pub struct AppState {
    pub tracker: Arc<UploadTracker>,
    pub queue: Arc<Queue>,
    pub lock: Arc<DistributedLock>,
    pub object_store: Arc<ObjectStore>,
    pub transaction_store: Arc<cnab_ingest_logic::transaction_store::TransactionStore>,
    pub sweeper: Arc<RecoverySweeper>,
    /// Only invoked directly by a request handler in the synchronous
    /// compatibility mode (§4.10 step 9); otherwise driven by the
    /// background hosted loop spawned at startup.
    pub worker_pool: Arc<WorkerPool>,
    pub settings: IngestSettings,
    pub intake_settings: UploadIntakeSettings,
}
