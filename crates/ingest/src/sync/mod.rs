//! The ingestion loop: cursor-resumed fetch plus per-message processing
//!
//! One cycle authenticates, pulls new messages via delta sync, and routes
//! each attachment either to the queue or straight through extraction.
//! At most one cycle runs at a time.

mod cycle;
mod stats;
mod timing;

pub use cycle::{CycleOutcome, CycleStats, Monitor};
pub use stats::{MonitorStats, StatsSnapshot};
pub use timing::interval_elapsed;
