//! Courierd - the attachment ingestion daemon
//!
//! Wires the core pieces together: a timer-driven ingestion loop, an
//! optional worker pool consuming the attachment queue, and a minimal HTTP
//! status surface. Missing Graph credentials disable ingestion but leave
//! the status server running so operators can see why nothing is flowing.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ingest::extract::ExtractorSet;
use ingest::graph::{GraphAuth, GraphClient};
use ingest::queue::AttachmentQueue;
use ingest::storage::{ArtifactStore, CursorStore};
use ingest::sync::{Monitor, MonitorStats, interval_elapsed};
use ingest::watch::FolderWatcher;
use ingest::worker::{ExtractionPipeline, WorkerManager};
use ingest::{GraphCredentials, MonitorConfig, ProcessingMode};

mod server;

use server::StatusServer;

/// How often the worker supervisor checks liveness
const WORKER_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// How often the scheduler re-evaluates the timer and trigger flag
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config and data directories
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {e}");
    }

    let monitor_config = MonitorConfig::from_env();
    info!(
        "Courier starting: mode={}, poll interval={}s",
        monitor_config.mode.as_str(),
        monitor_config.poll_interval_secs
    );

    let artifacts = match ArtifactStore::new(
        &monitor_config.attachments_dir,
        &monitor_config.results_dir,
    ) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot create artifact directories: {e:#}");
            return;
        }
    };

    let queue = match monitor_config.mode {
        ProcessingMode::Queue => Some(Arc::new(AttachmentQueue::new(
            "email_attachments",
            monitor_config.max_queue_len,
            monitor_config.max_item_size,
        ))),
        ProcessingMode::Direct => None,
    };

    // Graceful degradation: a missing credential set disables the ingestion
    // loop while the status surface keeps answering.
    let monitor = match GraphCredentials::load() {
        Ok(creds) => {
            let client = GraphClient::new(GraphAuth::new(creds));
            match Monitor::new(
                monitor_config.clone(),
                Box::new(client),
                CursorStore::new(&monitor_config.cursor_path),
                ExtractorSet::with_default_extractors(),
                queue.clone(),
                artifacts.clone(),
                Arc::new(MonitorStats::new()),
            ) {
                Ok(monitor) => {
                    info!("Ingestion loop initialized");
                    Some(Arc::new(monitor))
                }
                Err(e) => {
                    error!("Could not initialize ingestion loop: {e:#}");
                    None
                }
            }
        }
        Err(e) => {
            warn!("Graph credentials not found: {e:#}");
            if let Some(path) = GraphCredentials::default_credentials_path() {
                warn!(
                    "To enable ingestion, place credentials at {} or set \
                     GRAPH_CLIENT_ID / GRAPH_CLIENT_SECRET / GRAPH_TENANT_ID",
                    path.display()
                );
            }
            None
        }
    };

    // Worker pool (Queue mode only)
    let manager = queue.as_ref().map(|queue| {
        let pipeline = Arc::new(ExtractionPipeline::new(Arc::new(
            ExtractorSet::with_default_extractors(),
        )));
        let manager = Arc::new(WorkerManager::new(
            &monitor_config,
            Arc::clone(queue),
            pipeline,
            artifacts.clone(),
        ));
        manager.start();

        let supervisor = Arc::clone(&manager);
        std::thread::Builder::new()
            .name("worker-supervisor".to_string())
            .spawn(move || supervisor.monitor_loop(WORKER_MONITOR_INTERVAL))
            .expect("failed to spawn worker supervisor");
        manager
    });

    // Second producer: folder watch feeding the same queue
    if let (Some(queue), Some(watch_dir)) = (&queue, &monitor_config.upload_watch_dir) {
        match FolderWatcher::new(watch_dir, Arc::clone(queue), &monitor_config) {
            Ok(watcher) => {
                let interval = monitor_config.worker_poll();
                std::thread::Builder::new()
                    .name("folder-watch".to_string())
                    .spawn(move || {
                        // The watcher has no independent stop condition; it
                        // lives as long as the daemon
                        let run_forever = AtomicBool::new(false);
                        watcher.run(&run_forever, interval)
                    })
                    .expect("failed to spawn folder watch");
            }
            Err(e) => error!("Folder watch disabled: {e:#}"),
        }
    } else if monitor_config.upload_watch_dir.is_some() {
        warn!("UPLOAD_WATCH_DIR is set but ignored in Direct mode");
    }

    let trigger = Arc::new(AtomicBool::new(false));

    // Scheduler: the timer tick and the manual trigger funnel into the same
    // mutex-guarded cycle entry point.
    if let Some(monitor) = monitor.clone() {
        let trigger = Arc::clone(&trigger);
        let interval = monitor_config.poll_interval_secs;
        std::thread::Builder::new()
            .name("ingest-scheduler".to_string())
            .spawn(move || {
                let mut last_run: Option<DateTime<Utc>> = None;
                loop {
                    std::thread::sleep(SCHEDULER_TICK);
                    let triggered = trigger.swap(false, Ordering::SeqCst);
                    if triggered || interval_elapsed(last_run, interval) {
                        last_run = Some(Utc::now());
                        monitor.run_cycle();
                    }
                }
            })
            .expect("failed to spawn scheduler");
        info!("Ingestion scheduled every {interval}s");
    }

    // Status surface on the main thread
    let addr =
        std::env::var("COURIER_STATUS_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let server = StatusServer::new(monitor, queue, manager.clone(), artifacts, trigger);

    match TcpListener::bind(&addr) {
        Ok(listener) => {
            info!("Status surface listening on http://{addr}");
            server.run(listener);
        }
        Err(e) => {
            error!("Cannot bind status surface on {addr}: {e}");
            // Keep the daemon alive for the scheduler and workers
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    // The listener loop never returns; if it ever does, stop the workers.
    if let Some(manager) = manager {
        manager.stop();
    }
}
