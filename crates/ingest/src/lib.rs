//! Ingest crate - Core logic for the Courier attachment pipeline
//!
//! This crate provides platform-independent ingestion functionality:
//! - Domain models (Message, AttachmentRecord, DeltaCursor)
//! - Graph API client with delta-query sync and OAuth2 authentication
//! - Bounded attachment queue with admission control
//! - The ingestion loop (Direct and Queue processing modes)
//! - Worker pool with retry, backoff, and supervised restarts
//! - Pluggable content extractors (PDF, spreadsheets, CSV, DOCX, text)
//! - Artifact and cursor persistence
//!
//! Delivery is at-least-once by design: a queue pop is destructive, so a
//! worker crash between pop and result-commit loses that item. The cursor
//! only advances after a complete successful sweep, so messages are never
//! refetched and never silently skipped.
//!
//! This crate has no daemon wiring; see the `courierd` binary for the
//! scheduler, worker supervision, and the HTTP status surface.

pub mod config;
pub mod extract;
pub mod graph;
pub mod models;
pub mod queue;
pub mod storage;
pub mod sync;
pub mod watch;
pub mod worker;

pub use config::{GraphCredentials, MonitorConfig, ProcessingMode};
pub use extract::{ContentExtractor, ExtractedContent, ExtractorSet};
pub use graph::{
    AttachmentMeta, AuthError, DeltaPage, FetchError, GraphAuth, GraphClient, MailSource,
    SenderFilter,
};
pub use models::{AttachmentRecord, DeltaCursor, EmailAddress, EmailContext, Message, MessageId};
pub use queue::{AttachmentQueue, EnqueueError, QueueHealth, QueueStats};
pub use storage::{ArtifactStore, CursorStore, TaskResult, TaskStatus};
pub use sync::{
    // Cycle execution
    CycleOutcome, CycleStats, Monitor,
    // Shared counters (for the status surface)
    MonitorStats, StatsSnapshot,
    // Scheduler timing (for the daemon's tick loop)
    interval_elapsed,
};
pub use watch::FolderWatcher;
pub use worker::{
    AttachmentWorker, ExtractionPipeline, ProcessingPipeline, WorkerManager, WorkerStats,
};
