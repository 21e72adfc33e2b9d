pub mod checkpoint;
pub mod error;
pub mod hash;
pub mod intake;
pub mod line_processor;
pub mod lock;
pub mod object_store;
pub mod parser;
pub mod queue;
pub mod recovery;
pub mod settings;
pub mod tracker;
pub mod transaction_store;
pub mod worker_pool;

pub use error::{IngestError, Result};
pub use intake::{IntakeOutcome, UploadIntake, UploadIntakeSettings};
pub use lock::DistributedLock;
pub use object_store::{ObjectStore, ObjectStoreSettings};
pub use queue::Queue;
pub use recovery::RecoverySweeper;
pub use settings::IngestSettings;
pub use tracker::{FileUpload, UploadTracker};
pub use worker_pool::WorkerPool;
