//! Result artifact persistence
//!
//! Attachments, `.processed.json` sidecars, per-message summaries, and
//! worker task results are all plain files under two roots. Every JSON
//! artifact is written atomically (temp + rename) and carries a sortable
//! timestamp field so "most recent N" queries are cheap.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::ExtractedContent;

/// Terminal state of a worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// Email fields echoed into summary artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEmailInfo {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
}

/// One attachment handled in Direct mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedAttachment {
    pub original_filename: String,
    pub saved_filename: String,
    pub file_type: String,
    pub file_size: u64,
}

/// Per-message artifact written after Direct-mode processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub email_info: SummaryEmailInfo,
    pub processed_at: DateTime<Utc>,
    pub attachments_processed: usize,
    pub attachments: Vec<ProcessedAttachment>,
}

/// One attachment admitted to (or rejected from) the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueuedAttachment {
    pub task_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub attachment_id: String,
}

/// Per-message artifact written after Queue-mode enqueueing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueSummary {
    pub email_info: SummaryEmailInfo,
    pub enqueued_at: DateTime<Utc>,
    pub total_attachments: usize,
    pub attachments_enqueued: usize,
    pub enqueued_attachments: Vec<EnqueuedAttachment>,
}

/// Terminal artifact for one worker task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub email_info: SummaryEmailInfo,
    pub attachment_filename: String,
    pub attachment_mime_type: String,
    pub attachment_size: u64,
    pub processing_result: Value,
    pub errors: Vec<String>,
    pub attempts: u32,
    pub processing_time_secs: f64,
    pub processed_at: DateTime<Utc>,
    pub worker_id: String,
}

/// Filesystem store for attachments and result artifacts.
///
/// Cloneable so each worker can carry its own handle; the underlying
/// directories are shared and writes are atomic.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    attachments_dir: PathBuf,
    results_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(attachments_dir: impl AsRef<Path>, results_dir: impl AsRef<Path>) -> Result<Self> {
        let attachments_dir = attachments_dir.as_ref().to_path_buf();
        let results_dir = results_dir.as_ref().to_path_buf();
        fs::create_dir_all(&attachments_dir)
            .with_context(|| format!("Failed to create {}", attachments_dir.display()))?;
        fs::create_dir_all(&results_dir)
            .with_context(|| format!("Failed to create {}", results_dir.display()))?;
        Ok(Self {
            attachments_dir,
            results_dir,
        })
    }

    pub fn attachments_dir(&self) -> &Path {
        &self.attachments_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Write a file atomically (temp in the same directory, then rename)
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, bytes)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value).context("Failed to serialize artifact")?;
        Self::write_atomic(path, &json)
    }

    /// Save raw attachment bytes under a collision-free name.
    pub fn save_attachment(&self, unique_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.attachments_dir.join(unique_name);
        Self::write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Save the extraction sidecar next to the attachment.
    pub fn save_processed(&self, unique_name: &str, content: &ExtractedContent) -> Result<PathBuf> {
        let path = self
            .attachments_dir
            .join(format!("{unique_name}.processed.json"));
        Self::write_json(&path, content)?;
        Ok(path)
    }

    /// Save a Direct-mode per-message summary.
    pub fn save_processing_summary(&self, summary: &ProcessingSummary) -> Result<PathBuf> {
        let name = format!(
            "{}_{}_processing_summary_{}.json",
            summary.processed_at.format("%Y-%m-%d"),
            short_uuid(),
            short_id(&summary.email_info.message_id),
        );
        let path = self.attachments_dir.join(name);
        Self::write_json(&path, summary)?;
        Ok(path)
    }

    /// Save a Queue-mode per-message summary.
    pub fn save_enqueue_summary(&self, summary: &EnqueueSummary) -> Result<PathBuf> {
        let name = format!(
            "{}_{}_enqueue_summary_{}.json",
            summary.enqueued_at.format("%Y-%m-%d"),
            short_uuid(),
            short_id(&summary.email_info.message_id),
        );
        let path = self.attachments_dir.join(name);
        Self::write_json(&path, summary)?;
        Ok(path)
    }

    /// Save a worker task result, keyed by task id.
    pub fn save_task_result(&self, result: &TaskResult) -> Result<PathBuf> {
        let name = format!(
            "{}_{}.json",
            result.task_id,
            result.processed_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.results_dir.join(name);
        Self::write_json(&path, result)?;
        Ok(path)
    }

    /// Most recent worker results, newest first.
    pub fn recent_results(&self, limit: usize) -> Vec<TaskResult> {
        let mut results = Self::load_all::<TaskResult>(&self.results_dir);
        results.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        results.truncate(limit);
        results
    }

    /// Most recent per-message summaries (both modes), newest first, as raw
    /// JSON for the status surface.
    pub fn recent_summaries(&self, limit: usize) -> Vec<Value> {
        let mut summaries: Vec<(DateTime<Utc>, Value)> = Vec::new();

        let Ok(entries) = fs::read_dir(&self.attachments_dir) else {
            return Vec::new();
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.contains("_summary_") || !name.ends_with(".json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            let timestamp = ["processed_at", "enqueued_at"]
                .iter()
                .find_map(|k| value.get(k).and_then(|v| v.as_str()))
                .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                .unwrap_or_default();
            summaries.push((timestamp, value));
        }

        summaries.sort_by(|a, b| b.0.cmp(&a.0));
        summaries.into_iter().take(limit).map(|(_, v)| v).collect()
    }

    fn load_all<T: serde::de::DeserializeOwned>(dir: &Path) -> Vec<T> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| fs::read_to_string(e.path()).ok())
            .filter_map(|raw| serde_json::from_str(&raw).ok())
            .collect()
    }
}

fn short_uuid() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[..8].to_string()
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}
