//! The attachment worker loop
//!
//! Dequeue, stage to a temp file, run the processing pipeline with bounded
//! retries, persist the result. The temp file is owned by `tempfile`'s RAII
//! guard, so it is removed on every exit path.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::extract::{ExtractorSet, fields};
use crate::models::AttachmentRecord;
use crate::queue::AttachmentQueue;
use crate::storage::{ArtifactStore, SummaryEmailInfo, TaskResult, TaskStatus};

use super::retry::retry_with_backoff;

/// The per-task processing step run by a worker.
///
/// `staged` is the attachment materialized to a scoped temp file; the
/// returned value is persisted verbatim inside the task result.
pub trait ProcessingPipeline: Send + Sync {
    fn process(&self, record: &AttachmentRecord, staged: &Path) -> Result<Value>;
}

/// Default pipeline: content extraction plus domain field extraction.
pub struct ExtractionPipeline {
    extractors: Arc<ExtractorSet>,
}

impl ExtractionPipeline {
    pub fn new(extractors: Arc<ExtractorSet>) -> Self {
        Self { extractors }
    }
}

impl ProcessingPipeline for ExtractionPipeline {
    fn process(&self, record: &AttachmentRecord, _staged: &Path) -> Result<Value> {
        let content = self.extractors.extract(
            &record.content,
            &record.filename,
            &[
                ("email_id", record.email.message_id.as_str()),
                ("email_subject", record.email.subject.as_str()),
            ],
        );

        let invoice_fields = if record.extension() == ".pdf" {
            fields::extract_invoice_fields(&content.text)
        } else {
            Default::default()
        };

        Ok(serde_json::json!({
            "content": content,
            "invoice_fields": invoice_fields,
        }))
    }
}

/// Per-process worker counters, shared across the pool
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    last_processed_ms: AtomicI64,
}

/// Serializable snapshot of [`WorkerStats`]
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatsSnapshot {
    pub processed_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, success: bool) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.last_processed_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let last_ms = self.last_processed_ms.load(Ordering::Relaxed);
        WorkerStatsSnapshot {
            processed_count: self.processed_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_processed_at: if last_ms > 0 {
                Utc.timestamp_millis_opt(last_ms).single()
            } else {
                None
            },
        }
    }
}

/// One queue consumer.
///
/// Workers are independent: no shared mutable state besides the queue and
/// the atomic counters, so any number can run concurrently and each is
/// restartable in isolation.
pub struct AttachmentWorker {
    id: String,
    queue: Arc<AttachmentQueue>,
    pipeline: Arc<dyn ProcessingPipeline>,
    artifacts: ArtifactStore,
    stats: Arc<WorkerStats>,
    poll_interval: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    temp_dir: PathBuf,
}

impl AttachmentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        queue: Arc<AttachmentQueue>,
        pipeline: Arc<dyn ProcessingPipeline>,
        artifacts: ArtifactStore,
        stats: Arc<WorkerStats>,
        poll_interval: Duration,
        max_retries: u32,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            pipeline,
            artifacts,
            stats,
            poll_interval,
            max_retries,
            retry_base_delay: Duration::from_secs(2),
            temp_dir,
        }
    }

    /// Shrink the backoff base delay (tests only need milliseconds)
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Main worker loop: runs until `shutdown` is observed.
    ///
    /// A dequeue timeout is an idle poll, not an error; it exists so the
    /// shutdown flag is checked at least once per poll interval.
    pub fn run(&self, shutdown: &AtomicBool) {
        info!("Worker {} started", self.id);
        if let Err(e) = std::fs::create_dir_all(&self.temp_dir) {
            error!("Worker {} cannot create temp dir: {e}", self.id);
            return;
        }

        while !shutdown.load(Ordering::Relaxed) {
            let Some(record) = self.queue.dequeue_blocking(self.poll_interval) else {
                debug!("Worker {} idle", self.id);
                continue;
            };

            info!(
                "Worker {} processing {} from: {:.50}",
                self.id,
                record.describe(),
                record.email.subject
            );
            let success = self.process_record(&record);
            self.stats.record(success);
        }

        info!("Worker {} stopped", self.id);
    }

    /// Process one record end to end, returning whether it succeeded.
    ///
    /// Failures are terminal for the task (the record is not re-enqueued);
    /// a failed `TaskResult` artifact is persisted so operators can detect
    /// and resubmit.
    pub fn process_record(&self, record: &AttachmentRecord) -> bool {
        let start = std::time::Instant::now();

        let mut attempts = 0;
        let outcome = self.stage_and_process(record, &mut attempts);
        let elapsed = start.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(value) => {
                info!(
                    "Worker {} completed {} in {:.2}s",
                    self.id,
                    record.task_id,
                    elapsed
                );
                self.make_result(record, TaskStatus::Completed, value, Vec::new(), attempts, elapsed)
            }
            Err(e) => {
                error!(
                    "Worker {} giving up on {}: {e:#}",
                    self.id, record.task_id
                );
                self.make_result(
                    record,
                    TaskStatus::Failed,
                    Value::Null,
                    vec![format!("{e:#}")],
                    attempts,
                    elapsed,
                )
            }
        };

        let success = result.status == TaskStatus::Completed;
        if let Err(e) = self.artifacts.save_task_result(&result) {
            error!("Worker {} could not save result for {}: {e:#}", self.id, record.task_id);
            return false;
        }
        success
    }

    /// Materialize the attachment and run the pipeline with retries.
    ///
    /// `attempts` reports how many pipeline attempts actually ran (zero when
    /// staging itself failed). The temp file guard drops on every path out
    /// of this function.
    fn stage_and_process(&self, record: &AttachmentRecord, attempts: &mut u32) -> Result<Value> {
        let staged = tempfile::Builder::new()
            .prefix(&format!("{}_", record.task_id))
            .suffix(&record.extension())
            .tempfile_in(&self.temp_dir)
            .context("Failed to create temp file")?;

        std::fs::write(staged.path(), &record.content)
            .context("Failed to stage attachment bytes")?;
        debug!("Worker {} staged {}", self.id, staged.path().display());

        let value = retry_with_backoff(self.max_retries, self.retry_base_delay, |attempt| {
            *attempts = attempt;
            self.pipeline.process(record, staged.path())
        })?;

        Ok(value)
    }

    fn make_result(
        &self,
        record: &AttachmentRecord,
        status: TaskStatus,
        processing_result: Value,
        errors: Vec<String>,
        attempts: u32,
        processing_time_secs: f64,
    ) -> TaskResult {
        TaskResult {
            task_id: record.task_id.clone(),
            status,
            email_info: SummaryEmailInfo {
                message_id: record.email.message_id.clone(),
                subject: record.email.subject.clone(),
                sender: record.email.sender_address.clone(),
            },
            attachment_filename: record.filename.clone(),
            attachment_mime_type: record.mime_type.clone(),
            attachment_size: record.size,
            processing_result,
            errors,
            attempts,
            processed_at: Utc::now(),
            processing_time_secs,
            worker_id: self.id.clone(),
        }
    }
}
