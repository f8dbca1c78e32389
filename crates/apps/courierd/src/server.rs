//! Minimal HTTP status surface
//!
//! Thin read/write wrappers over the core components' public accessors: no
//! framework, just a request line parsed off a TCP stream and a JSON body
//! written back. Anything heavier belongs in a real dashboard, which this
//! daemon deliberately does not grow.

use log::{debug, warn};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ingest::queue::AttachmentQueue;
use ingest::storage::ArtifactStore;
use ingest::sync::Monitor;
use ingest::worker::WorkerManager;

/// Shared handles the endpoints read from
pub struct StatusServer {
    monitor: Option<Arc<Monitor>>,
    queue: Option<Arc<AttachmentQueue>>,
    manager: Option<Arc<WorkerManager>>,
    artifacts: ArtifactStore,
    /// Set by POST /process-now; the scheduler collapses it into the next
    /// tick so triggers and timer runs share the same entry point
    trigger: Arc<AtomicBool>,
}

impl StatusServer {
    pub fn new(
        monitor: Option<Arc<Monitor>>,
        queue: Option<Arc<AttachmentQueue>>,
        manager: Option<Arc<WorkerManager>>,
        artifacts: ArtifactStore,
        trigger: Arc<AtomicBool>,
    ) -> Self {
        Self {
            monitor,
            queue,
            manager,
            artifacts,
            trigger,
        }
    }

    /// Accept connections forever.
    pub fn run(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("Status request failed: {e}");
                    }
                }
                Err(e) => warn!("Failed to accept status connection: {e}"),
            }
        }
    }

    fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        // Format: GET /status HTTP/1.1
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or("");
        let path = parts.next().unwrap_or("/");
        debug!("Status request: {method} {path}");

        let (status, body) = self.route(method, path);
        let payload = serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string());
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        stream.write_all(response.as_bytes())
    }

    /// Dispatch one request; pure with respect to the HTTP layer so routes
    /// are testable without sockets.
    pub fn route(&self, method: &str, path: &str) -> (&'static str, Value) {
        match (method, path) {
            ("GET", "/") => ("200 OK", self.banner()),
            ("GET", "/status") => ("200 OK", self.status()),
            ("GET", "/health") => ("200 OK", self.health()),
            ("GET", "/queue") => ("200 OK", self.queue_info()),
            ("GET", "/workers") => ("200 OK", self.worker_info()),
            ("GET", "/recent-results") => ("200 OK", self.recent_results()),
            ("POST", "/process-now") => ("200 OK", self.trigger_cycle()),
            ("POST", "/queue/clear") => ("200 OK", self.clear_queue()),
            _ => (
                "404 Not Found",
                json!({"error": format!("no route for {method} {path}")}),
            ),
        }
    }

    fn banner(&self) -> Value {
        json!({
            "service": "courierd",
            "status": "running",
            "ingestion_enabled": self.monitor.is_some(),
            "idempotency": "provider delta queries ensure no duplicates",
        })
    }

    fn status(&self) -> Value {
        match &self.monitor {
            Some(monitor) => {
                let config = monitor.config();
                json!({
                    "status": "running",
                    "stats": monitor.stats().snapshot(),
                    "config": {
                        "mode": config.mode.as_str(),
                        "poll_interval_secs": config.poll_interval_secs,
                        "sender_groups": config.sender_groups,
                        "file_types": config.allowed_extensions,
                        "attachments_dir": config.attachments_dir.display().to_string(),
                    },
                })
            }
            None => json!({
                "status": "degraded",
                "reason": "Graph credentials not configured; ingestion disabled",
            }),
        }
    }

    fn health(&self) -> Value {
        json!({
            "ingestion_enabled": self.monitor.is_some(),
            "queue": self.queue.as_ref().map(|q| q.health_check()),
            "workers": self.manager.as_ref().map(|m| m.health_check()),
        })
    }

    fn queue_info(&self) -> Value {
        match &self.queue {
            Some(queue) => json!({
                "stats": queue.stats(),
                "health": queue.health_check(),
                "preview": queue.peek(5),
            }),
            None => json!({"error": "queue not enabled (Direct mode)"}),
        }
    }

    fn worker_info(&self) -> Value {
        match &self.manager {
            Some(manager) => json!({
                "stats": manager.stats_snapshot(),
                "health": manager.health_check(),
            }),
            None => json!({"error": "workers not enabled (Direct mode)"}),
        }
    }

    fn recent_results(&self) -> Value {
        json!({
            "recent_results": self.artifacts.recent_results(10),
            "recent_summaries": self.artifacts.recent_summaries(10),
        })
    }

    fn trigger_cycle(&self) -> Value {
        if self.monitor.is_none() {
            return json!({"error": "ingestion disabled"});
        }
        self.trigger.store(true, Ordering::SeqCst);
        json!({"message": "ingestion cycle triggered"})
    }

    fn clear_queue(&self) -> Value {
        match &self.queue {
            Some(queue) => json!({"cleared": queue.clear()}),
            None => json!({"error": "queue not enabled (Direct mode)"}),
        }
    }
}
