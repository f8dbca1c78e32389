//! Process-wide ingestion counters
//!
//! Soft state: counters live for the process lifetime and reset on restart.
//! Shared via `Arc` between the monitor and the status surface.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Shared counters updated by the ingestion loop
#[derive(Debug, Default)]
pub struct MonitorStats {
    total_runs: AtomicU64,
    messages_processed: AtomicU64,
    attachments_processed: AtomicU64,
    attachments_queued: AtomicU64,
    errors: AtomicU64,
    queue_errors: AtomicU64,
    /// Milliseconds since epoch of the last completed cycle (0 = never)
    last_run_ms: AtomicI64,
}

/// Point-in-time copy of the counters for serialization
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_runs: u64,
    pub messages_processed: u64,
    pub attachments_processed: u64,
    pub attachments_queued: u64,
    pub errors: u64,
    pub queue_errors: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle_complete(&self) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.last_run_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn add_messages_processed(&self, count: u64) {
        self.messages_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_attachments_processed(&self, count: u64) {
        self.attachments_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_attachments_queued(&self, count: u64) {
        self.attachments_queued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_run_ms = self.last_run_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            attachments_processed: self.attachments_processed.load(Ordering::Relaxed),
            attachments_queued: self.attachments_queued.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
            last_run: if last_run_ms > 0 {
                Utc.timestamp_millis_opt(last_run_ms).single()
            } else {
                None
            },
        }
    }
}
