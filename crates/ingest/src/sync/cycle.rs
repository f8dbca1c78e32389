//! One ingestion cycle: authenticate, fetch, process
//!
//! The cycle body runs under a process-wide lock so a manual trigger can
//! never race the timer-driven run: whichever arrives second is rejected,
//! protecting the cursor's read-then-write from interleaving.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, TryLockError};

use crate::config::{MonitorConfig, ProcessingMode};
use crate::extract::ExtractorSet;
use crate::graph::{AttachmentMeta, FetchError, MailSource, SenderFilter};
use crate::models::{AttachmentRecord, EmailContext, Message};
use crate::queue::AttachmentQueue;
use crate::storage::{
    ArtifactStore, CursorStore, EnqueueSummary, EnqueuedAttachment, ProcessedAttachment,
    ProcessingSummary, SummaryEmailInfo,
};

use super::MonitorStats;

/// Counters for a single cycle
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleStats {
    /// Messages returned by the delta sweep
    pub messages_fetched: usize,
    /// Messages that reported attachments and were worked on
    pub messages_with_attachments: usize,
    /// Attachments extracted synchronously (Direct mode)
    pub attachments_processed: usize,
    /// Attachments admitted to the queue (Queue mode)
    pub attachments_queued: usize,
    /// Attachments skipped (filtered extension, failed or empty download)
    pub attachments_skipped: usize,
    /// Per-message and per-attachment errors
    pub errors: usize,
    /// Duration of the cycle
    pub duration_ms: u64,
}

/// Result of invoking `run_cycle`
#[derive(Debug)]
pub enum CycleOutcome {
    /// The cycle ran to completion (possibly with per-item errors)
    Completed(CycleStats),
    /// Another cycle was in flight; this invocation did nothing
    AlreadyRunning,
    /// Authentication failed; no fetch was attempted
    AuthFailed,
    /// The delta sweep failed; the cursor was not advanced
    FetchFailed,
}

/// The ingestion orchestrator.
///
/// Owns the mail source, cursor store, and artifact store; constructed once
/// at startup from explicit dependencies (no ambient globals) and shared
/// behind an `Arc` with the scheduler and the status surface.
pub struct Monitor {
    config: MonitorConfig,
    /// The cycle lock doubles as the mail-source owner: holding it IS
    /// holding the right to run a cycle.
    source: Mutex<Box<dyn MailSource>>,
    cursor_store: CursorStore,
    extractors: ExtractorSet,
    queue: Option<Arc<AttachmentQueue>>,
    artifacts: ArtifactStore,
    stats: Arc<MonitorStats>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        source: Box<dyn MailSource>,
        cursor_store: CursorStore,
        extractors: ExtractorSet,
        queue: Option<Arc<AttachmentQueue>>,
        artifacts: ArtifactStore,
        stats: Arc<MonitorStats>,
    ) -> Result<Self> {
        if config.mode == ProcessingMode::Queue && queue.is_none() {
            bail!("Queue mode requires an attachment queue");
        }

        Ok(Self {
            config,
            source: Mutex::new(source),
            cursor_store,
            extractors,
            queue,
            artifacts,
            stats,
        })
    }

    pub fn stats(&self) -> &Arc<MonitorStats> {
        &self.stats
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one ingestion cycle.
    ///
    /// Safe to call concurrently from the timer and the manual trigger: at
    /// most one cycle executes, the loser returns `AlreadyRunning`.
    pub fn run_cycle(&self) -> CycleOutcome {
        let mut source = match self.source.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!("Ingestion cycle already in flight; trigger rejected");
                return CycleOutcome::AlreadyRunning;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let start = std::time::Instant::now();
        let mut cycle = CycleStats::default();
        info!("Starting ingestion cycle");

        if let Err(e) = source.authenticate() {
            error!("Authentication failed, aborting cycle: {e}");
            self.stats.record_error();
            return CycleOutcome::AuthFailed;
        }

        let filter = SenderFilter::new(self.config.sender_groups.clone());
        let cursor = self.cursor_store.load();
        if cursor.is_some() {
            debug!("Using delta sync, only new messages will be fetched");
        } else {
            info!("No cursor found, performing full sync");
        }

        let page = match source.fetch_new_messages(cursor.as_ref(), &filter) {
            Ok(page) => page,
            Err(FetchError::CursorExpired) => {
                warn!("Delta cursor expired, restarting with a full sync");
                if let Err(e) = self.cursor_store.clear() {
                    warn!("Could not clear expired cursor: {e}");
                }
                match source.fetch_new_messages(None, &filter) {
                    Ok(page) => page,
                    Err(e) => {
                        error!("Full sync after cursor expiry failed: {e}");
                        self.stats.record_error();
                        return CycleOutcome::FetchFailed;
                    }
                }
            }
            Err(e) => {
                error!("Fetching new messages failed: {e}");
                self.stats.record_error();
                return CycleOutcome::FetchFailed;
            }
        };

        // Persist the cursor before any per-message work: a crash mid-batch
        // must not refetch this page next cycle.
        if let Some(new_cursor) = &page.cursor {
            if let Err(e) = self.cursor_store.store(new_cursor) {
                error!("Could not persist delta cursor: {e}");
                self.stats.record_error();
            }
        }

        cycle.messages_fetched = page.messages.len();
        if page.messages.is_empty() {
            info!("No new messages to process");
        }

        for message in &page.messages {
            if !message.has_attachments {
                continue;
            }
            cycle.messages_with_attachments += 1;

            if let Err(e) = self.process_message(source.as_ref(), message, &mut cycle) {
                error!(
                    "Error processing message {} ({}): {e:#}",
                    message.id.as_str(),
                    message.subject
                );
                cycle.errors += 1;
                self.stats.record_error();
            }
        }

        cycle.duration_ms = start.elapsed().as_millis() as u64;
        self.stats.add_messages_processed(cycle.messages_fetched as u64);
        self.stats
            .add_attachments_processed(cycle.attachments_processed as u64);
        self.stats
            .add_attachments_queued(cycle.attachments_queued as u64);
        self.stats.record_cycle_complete();

        info!(
            "Cycle complete: {} messages, {} processed, {} queued, {} skipped, {} errors in {}ms",
            cycle.messages_fetched,
            cycle.attachments_processed,
            cycle.attachments_queued,
            cycle.attachments_skipped,
            cycle.errors,
            cycle.duration_ms
        );
        CycleOutcome::Completed(cycle)
    }

    /// Handle one message's attachments.
    ///
    /// Per-attachment failures are logged and skipped; only the attachment
    /// listing itself can fail the message.
    fn process_message(
        &self,
        source: &dyn MailSource,
        message: &Message,
        cycle: &mut CycleStats,
    ) -> Result<()> {
        let refs = source
            .list_attachments(&message.id)
            .context("Failed to list attachments")?;

        if refs.is_empty() {
            debug!(
                "Message {} reports attachments but listed none",
                message.id.as_str()
            );
            return Ok(());
        }

        info!(
            "Processing {} attachments for: {:.50}",
            refs.len(),
            message.subject
        );

        let records = self.download_attachments(source, message, &refs, cycle);
        if records.is_empty() {
            return Ok(());
        }

        match self.config.mode {
            ProcessingMode::Direct => self.process_directly(message, records, cycle),
            ProcessingMode::Queue => self.enqueue_records(message, records, cycle),
        }
    }

    /// Download every admissible attachment of a message.
    ///
    /// Filtered extensions and failed or empty downloads are skipped here so
    /// both modes see only viable records.
    fn download_attachments(
        &self,
        source: &dyn MailSource,
        message: &Message,
        refs: &[AttachmentMeta],
        cycle: &mut CycleStats,
    ) -> Vec<AttachmentRecord> {
        let mut records = Vec::new();

        for meta in refs {
            if !self.config.extension_allowed(&meta.name) {
                debug!("Skipping {} (extension not allowed)", meta.name);
                continue;
            }

            let bytes = match source.download_attachment(&message.id, &meta.id) {
                Ok(bytes) if bytes.is_empty() => {
                    warn!(
                        "Empty download for {} on message {}, skipping",
                        meta.name,
                        message.id.as_str()
                    );
                    cycle.attachments_skipped += 1;
                    continue;
                }
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        "Download failed for {} on message {}: {e}",
                        meta.name,
                        message.id.as_str()
                    );
                    cycle.attachments_skipped += 1;
                    continue;
                }
            };

            records.push(AttachmentRecord::new(
                EmailContext::from_message(message),
                &meta.id,
                &meta.name,
                bytes,
            ));
        }

        records
    }

    /// Direct mode: save, extract, and persist a sidecar per attachment.
    fn process_directly(
        &self,
        message: &Message,
        records: Vec<AttachmentRecord>,
        cycle: &mut CycleStats,
    ) -> Result<()> {
        let mut processed = Vec::new();

        for record in records {
            match self.save_and_extract(&record) {
                Ok(entry) => {
                    processed.push(entry);
                    cycle.attachments_processed += 1;
                }
                Err(e) => {
                    warn!("Failed to process {}: {e:#}", record.describe());
                    cycle.errors += 1;
                    self.stats.record_error();
                }
            }
        }

        if !processed.is_empty() {
            let summary = ProcessingSummary {
                email_info: summary_email_info(message),
                processed_at: Utc::now(),
                attachments_processed: processed.len(),
                attachments: processed,
            };
            self.artifacts
                .save_processing_summary(&summary)
                .context("Failed to save processing summary")?;
        }
        Ok(())
    }

    fn save_and_extract(&self, record: &AttachmentRecord) -> Result<ProcessedAttachment> {
        let unique_name = record.unique_filename();
        self.artifacts
            .save_attachment(&unique_name, &record.content)
            .context("Failed to save attachment")?;

        let content = self.extractors.extract(
            &record.content,
            &record.filename,
            &[
                ("email_id", record.email.message_id.as_str()),
                ("email_subject", record.email.subject.as_str()),
            ],
        );
        self.artifacts
            .save_processed(&unique_name, &content)
            .context("Failed to save extraction sidecar")?;

        Ok(ProcessedAttachment {
            original_filename: record.filename.clone(),
            saved_filename: unique_name,
            file_type: record.extension(),
            file_size: record.size,
        })
    }

    /// Queue mode: batch-enqueue after the whole message is downloaded.
    fn enqueue_records(
        &self,
        message: &Message,
        records: Vec<AttachmentRecord>,
        cycle: &mut CycleStats,
    ) -> Result<()> {
        // Constructor guarantees the queue exists in Queue mode
        let Some(queue) = &self.queue else {
            bail!("No queue configured");
        };

        let admitted = queue.enqueue_batch(&records);
        cycle.attachments_queued += admitted;
        for _ in admitted..records.len() {
            self.stats.record_queue_error();
        }

        info!(
            "Enqueued {admitted}/{} attachments from: {:.50}",
            records.len(),
            message.subject
        );

        let summary = EnqueueSummary {
            email_info: summary_email_info(message),
            enqueued_at: Utc::now(),
            total_attachments: records.len(),
            attachments_enqueued: admitted,
            enqueued_attachments: records
                .iter()
                .map(|r| EnqueuedAttachment {
                    task_id: r.task_id.clone(),
                    filename: r.filename.clone(),
                    mime_type: r.mime_type.clone(),
                    size: r.size,
                    attachment_id: r.attachment_id.clone(),
                })
                .collect(),
        };
        self.artifacts
            .save_enqueue_summary(&summary)
            .context("Failed to save enqueue summary")?;
        Ok(())
    }
}

fn summary_email_info(message: &Message) -> SummaryEmailInfo {
    SummaryEmailInfo {
        message_id: message.id.as_str().to_string(),
        subject: message.subject.clone(),
        sender: message.from.email.clone(),
    }
}
