//! Worker pool consuming attachment records from the queue
//!
//! Each worker is an independent thread competing for queue items. Workers
//! share nothing but the queue itself and the (atomic) statistics; the
//! manager replaces workers that die, subject to restart-rate limiting.

mod consumer;
mod manager;
mod retry;

pub use consumer::{
    AttachmentWorker, ExtractionPipeline, ProcessingPipeline, WorkerStats, WorkerStatsSnapshot,
};
pub use manager::{ManagerStats, WorkerHealth, WorkerManager};
pub use retry::{backoff_delays, retry_with_backoff};
