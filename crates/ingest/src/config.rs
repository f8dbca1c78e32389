//! Configuration loading for the ingestion pipeline
//!
//! Supports loading Graph API credentials from (in order of priority):
//! 1. JSON file (~/.config/courier/graph-credentials.json)
//! 2. Runtime environment variables (fallback)
//!
//! Runtime tuning for the monitor, queue, and workers comes from
//! environment variables with sensible defaults so a bare deployment works
//! out of the box.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credentials filename in the Courier config directory
const CREDENTIALS_FILE: &str = "graph-credentials.json";

/// OAuth2 client-credentials for Graph API access
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

#[derive(Deserialize)]
struct CredentialFile {
    client_id: String,
    client_secret: String,
    tenant_id: String,
}

impl GraphCredentials {
    /// Load credentials using the following priority:
    /// 1. JSON file (~/.config/courier/graph-credentials.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: CredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Ok(Self::from_credential_file(creds));
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: CredentialFile = config::load_json_file(path)?;
        Ok(Self::from_credential_file(creds))
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: CredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Ok(Self::from_credential_file(creds))
    }

    fn from_credential_file(creds: CredentialFile) -> Self {
        Self {
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            tenant_id: creds.tenant_id,
        }
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GRAPH_CLIENT_ID")
            .context("GRAPH_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GRAPH_CLIENT_SECRET")
            .context("GRAPH_CLIENT_SECRET environment variable not set")?;
        let tenant_id = std::env::var("GRAPH_TENANT_ID")
            .context("GRAPH_TENANT_ID environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
        })
    }

    /// Get the default credentials file path
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (file or env vars)
    pub fn is_available() -> bool {
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        std::env::var("GRAPH_CLIENT_ID").is_ok()
            && std::env::var("GRAPH_CLIENT_SECRET").is_ok()
            && std::env::var("GRAPH_TENANT_ID").is_ok()
    }
}

/// How attachments are handled once downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Extract content synchronously inside the ingestion cycle
    Direct,
    /// Enqueue records for the worker pool
    Queue,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Queue => "queue",
        }
    }
}

/// Runtime configuration for the ingestion pipeline.
///
/// Constructed once at startup and passed by reference to the monitor,
/// queue, and worker manager; nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds between ingestion cycles
    pub poll_interval_secs: u64,
    /// Case-insensitive substrings matched against sender addresses
    /// (empty = accept all senders)
    pub sender_groups: Vec<String>,
    /// Lowercase extensions with leading dot (empty = accept all)
    pub allowed_extensions: Vec<String>,
    /// Where downloaded attachments and summaries are written
    pub attachments_dir: PathBuf,
    /// Where worker result artifacts are written
    pub results_dir: PathBuf,
    /// Where the persisted delta cursor lives
    pub cursor_path: PathBuf,
    /// Direct or Queue mode
    pub mode: ProcessingMode,
    /// Maximum queued items before enqueues are rejected
    pub max_queue_len: usize,
    /// Maximum attachment size admitted to the queue, in bytes
    pub max_item_size: u64,
    /// Number of worker threads (Queue mode)
    pub worker_count: usize,
    /// Seconds a worker blocks on an empty queue before re-checking shutdown
    pub worker_poll_secs: u64,
    /// Retries after the first processing attempt fails
    pub max_retries: u32,
    /// Directory for worker scratch files
    pub temp_dir: PathBuf,
    /// Grace period when stopping workers
    pub shutdown_grace_secs: u64,
    /// Optional upload directory watched as a second queue producer
    pub upload_watch_dir: Option<PathBuf>,
}

impl MonitorConfig {
    /// Build configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let data_root = config::data_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            poll_interval_secs: env_parse("MONITOR_POLL_INTERVAL", 300),
            sender_groups: env_list("EMAIL_GROUPS", ""),
            allowed_extensions: env_list("FILE_TYPES", ".pdf,.docx,.xlsx")
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            attachments_dir: env_path("ATTACHMENTS_DIR", data_root.join("email_attachments")),
            results_dir: env_path("RESULTS_DIR", data_root.join("processing_results")),
            cursor_path: env_path("DELTA_CURSOR_FILE", data_root.join("delta_cursor.txt")),
            mode: match std::env::var("PROCESSING_MODE").as_deref() {
                Ok("queue") => ProcessingMode::Queue,
                _ => ProcessingMode::Direct,
            },
            max_queue_len: env_parse("MAX_QUEUE_SIZE", 1000),
            max_item_size: env_parse("MAX_ATTACHMENT_SIZE", 50 * 1024 * 1024),
            worker_count: env_parse("MAX_CONCURRENT_WORKERS", 1),
            worker_poll_secs: env_parse("WORKER_POLL_INTERVAL", 5),
            max_retries: env_parse("MAX_PIPELINE_RETRIES", 3),
            temp_dir: env_path("WORKER_TEMP_DIR", std::env::temp_dir().join("courier_worker")),
            shutdown_grace_secs: env_parse("WORKER_SHUTDOWN_GRACE", 30),
            upload_watch_dir: std::env::var("UPLOAD_WATCH_DIR").ok().map(PathBuf::from),
        }
    }

    /// Check an attachment filename against the extension allow-list.
    ///
    /// An empty allow-list accepts every extension.
    pub fn extension_allowed(&self, filename: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let ext = match filename.rfind('.') {
            Some(idx) => filename[idx..].to_lowercase(),
            None => return false,
        };
        self.allowed_extensions.iter().any(|a| *a == ext)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn worker_poll(&self) -> Duration {
        Duration::from_secs(self.worker_poll_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(var: &str, default: &str) -> Vec<String> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_path(var: &str, default: PathBuf) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or(default)
}
