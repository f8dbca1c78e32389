//! Durable state: the sync cursor and result artifacts

mod artifacts;
mod cursor;

pub use artifacts::{
    ArtifactStore, EnqueueSummary, EnqueuedAttachment, ProcessedAttachment, ProcessingSummary,
    SummaryEmailInfo, TaskResult, TaskStatus,
};
pub use cursor::CursorStore;
