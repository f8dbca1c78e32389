//! Folder-watch producer
//!
//! A second producer feeding the same attachment queue as the mail loop:
//! files dropped into an upload directory are wrapped in records with a
//! synthetic email context and pass through the same admission control as
//! mail-derived attachments. Ingested files move to a `processed/`
//! subdirectory so a restart never re-enqueues them.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::models::{AttachmentRecord, EmailContext};
use crate::queue::AttachmentQueue;

/// Subdirectory ingested files are moved into
const PROCESSED_SUBDIR: &str = "processed";

/// Sender address stamped on folder-derived records
const WATCH_SENDER: &str = "folder-watch@localhost";

/// Polls an upload directory and enqueues new files.
pub struct FolderWatcher {
    upload_dir: PathBuf,
    queue: Arc<AttachmentQueue>,
    allowed_extensions: Vec<String>,
}

impl FolderWatcher {
    pub fn new(
        upload_dir: impl AsRef<Path>,
        queue: Arc<AttachmentQueue>,
        config: &MonitorConfig,
    ) -> Result<Self> {
        let upload_dir = upload_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(upload_dir.join(PROCESSED_SUBDIR))
            .with_context(|| format!("Failed to prepare {}", upload_dir.display()))?;
        Ok(Self {
            upload_dir,
            queue,
            allowed_extensions: config.allowed_extensions.clone(),
        })
    }

    fn extension_allowed(&self, filename: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let ext = match filename.rfind('.') {
            Some(idx) => filename[idx..].to_lowercase(),
            None => return false,
        };
        self.allowed_extensions.iter().any(|a| *a == ext)
    }

    /// Scan the upload directory once, returning how many files were
    /// enqueued.
    ///
    /// Files the queue rejects (or that fail to read) stay in place for the
    /// next scan.
    pub fn scan_once(&self) -> usize {
        let entries = match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {e}", self.upload_dir.display());
                return 0;
            }
        };

        let mut enqueued = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };
            if !self.extension_allowed(&filename) {
                continue;
            }

            match self.ingest_file(&path, &filename) {
                Ok(()) => enqueued += 1,
                Err(e) => warn!("Skipping upload {}: {e:#}", path.display()),
            }
        }

        if enqueued > 0 {
            info!("Folder watch enqueued {enqueued} uploads");
        }
        enqueued
    }

    fn ingest_file(&self, path: &Path, filename: &str) -> Result<()> {
        let content = std::fs::read(path).context("Failed to read upload")?;
        if content.is_empty() {
            anyhow::bail!("upload is empty");
        }

        let record = AttachmentRecord::new(
            Self::synthetic_context(filename),
            format!("upload-{filename}"),
            filename,
            content,
        );
        self.queue
            .try_enqueue(&record)
            .map_err(|e| anyhow::anyhow!("queue rejected upload: {e}"))?;

        // Only after the queue accepted it: move out of the scan set
        let target = self
            .upload_dir
            .join(PROCESSED_SUBDIR)
            .join(record.unique_filename());
        std::fs::rename(path, &target).context("Failed to archive ingested upload")?;
        Ok(())
    }

    fn synthetic_context(filename: &str) -> EmailContext {
        EmailContext {
            message_id: format!("upload-{}", Utc::now().format("%Y%m%d")),
            subject: format!("Folder upload: {filename}"),
            sender_name: Some("Folder Watch".to_string()),
            sender_address: WATCH_SENDER.to_string(),
            body_preview: String::new(),
            received_at: Utc::now(),
        }
    }

    /// Producer loop for a dedicated thread.
    pub fn run(&self, shutdown: &AtomicBool, interval: Duration) {
        info!("Folder watch started on {}", self.upload_dir.display());
        while !shutdown.load(Ordering::Relaxed) {
            self.scan_once();
            std::thread::sleep(interval);
        }
        info!("Folder watch stopped");
    }
}
