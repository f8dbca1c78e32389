//! Worker pool supervision
//!
//! Spawns N worker threads, polls their liveness, and replaces any that
//! die. Restarts are rate-limited per slot so a worker that dies on
//! startup cannot spin the manager in a tight respawn loop.

use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::queue::AttachmentQueue;
use crate::storage::ArtifactStore;

use super::consumer::{AttachmentWorker, ProcessingPipeline, WorkerStats, WorkerStatsSnapshot};

/// Minimum spacing between restarts of the same worker slot
const DEFAULT_MIN_RESTART_INTERVAL: Duration = Duration::from_secs(10);

struct WorkerSlot {
    id: String,
    handle: JoinHandle<()>,
    last_spawned: Instant,
}

/// Aggregate manager statistics
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub running: bool,
    pub workers_configured: usize,
    pub workers_alive: usize,
    pub restarts: u64,
    pub worker_totals: WorkerStatsSnapshot,
}

/// Per-worker liveness report
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub manager_running: bool,
    pub workers_configured: usize,
    pub workers_alive: usize,
    pub workers: Vec<WorkerHealthEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealthEntry {
    pub worker_id: String,
    pub alive: bool,
}

/// Supervises the worker pool.
///
/// All methods take `&self`; the manager is shared behind an `Arc` between
/// the daemon's main thread, the liveness monitor thread, and the status
/// surface.
pub struct WorkerManager {
    worker_count: usize,
    queue: Arc<AttachmentQueue>,
    pipeline: Arc<dyn ProcessingPipeline>,
    artifacts: ArtifactStore,
    stats: Arc<WorkerStats>,
    poll_interval: Duration,
    max_retries: u32,
    temp_dir: PathBuf,
    shutdown_grace: Duration,
    min_restart_interval: Duration,
    shutdown: Arc<AtomicBool>,
    running: AtomicBool,
    restarts: AtomicU64,
    slots: Mutex<Vec<WorkerSlot>>,
}

impl WorkerManager {
    pub fn new(
        config: &MonitorConfig,
        queue: Arc<AttachmentQueue>,
        pipeline: Arc<dyn ProcessingPipeline>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            queue,
            pipeline,
            artifacts,
            stats: Arc::new(WorkerStats::new()),
            poll_interval: config.worker_poll(),
            max_retries: config.max_retries,
            temp_dir: config.temp_dir.clone(),
            shutdown_grace: config.shutdown_grace(),
            min_restart_interval: DEFAULT_MIN_RESTART_INTERVAL,
            shutdown: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            restarts: AtomicU64::new(0),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Tighten the restart spacing (tests only)
    pub fn with_min_restart_interval(mut self, interval: Duration) -> Self {
        self.min_restart_interval = interval;
        self
    }

    pub fn worker_stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }

    fn spawn_worker(&self, id: String) -> std::io::Result<WorkerSlot> {
        let worker = AttachmentWorker::new(
            id.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            self.artifacts.clone(),
            Arc::clone(&self.stats),
            self.poll_interval,
            self.max_retries,
            self.temp_dir.clone(),
        );
        let shutdown = Arc::clone(&self.shutdown);

        let handle = std::thread::Builder::new()
            .name(id.clone())
            .spawn(move || worker.run(&shutdown))?;

        Ok(WorkerSlot {
            id,
            handle,
            last_spawned: Instant::now(),
        })
    }

    /// Start the configured number of workers.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Workers already running");
            return;
        }
        self.shutdown.store(false, Ordering::SeqCst);

        info!("Starting {} worker threads", self.worker_count);
        let mut slots = self.slots.lock().unwrap();
        for i in 1..=self.worker_count {
            let id = format!("worker_{i}");
            match self.spawn_worker(id.clone()) {
                Ok(slot) => slots.push(slot),
                Err(e) => error!("Failed to start {id}: {e}"),
            }
        }
        info!("All {} workers started", slots.len());
    }

    /// Replace dead workers, honoring the per-slot restart spacing.
    ///
    /// Returns the number of workers restarted.
    pub fn monitor_once(&self) -> usize {
        if !self.running.load(Ordering::SeqCst) || self.shutdown.load(Ordering::SeqCst) {
            return 0;
        }

        let mut restarted = 0;
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if !slot.handle.is_finished() {
                continue;
            }
            if slot.last_spawned.elapsed() < self.min_restart_interval {
                // Rate limit: a worker dying immediately after spawn waits
                // out the interval before the next attempt
                continue;
            }

            warn!("Worker {} is dead, restarting", slot.id);
            match self.spawn_worker(slot.id.clone()) {
                Ok(new_slot) => {
                    let old = std::mem::replace(slot, new_slot);
                    if old.handle.join().is_err() {
                        error!("Worker {} terminated by panic", old.id);
                    }
                    self.restarts.fetch_add(1, Ordering::SeqCst);
                    restarted += 1;
                }
                Err(e) => error!("Failed to restart worker {}: {e}", slot.id),
            }
        }
        restarted
    }

    /// Liveness-check loop for a dedicated supervisor thread.
    pub fn monitor_loop(&self, check_interval: Duration) {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.monitor_once();
            std::thread::sleep(check_interval);
        }
    }

    /// Signal all workers to stop and wait up to the grace period.
    ///
    /// Workers observe the flag between items (at latest after one poll
    /// timeout). Stragglers past the grace period are abandoned: their
    /// in-flight item is the documented at-least-once loss mode.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Workers not running");
            return;
        }

        info!("Stopping all workers");
        self.shutdown.store(true, Ordering::SeqCst);

        let mut slots = self.slots.lock().unwrap();
        let deadline = Instant::now() + self.shutdown_grace;

        while Instant::now() < deadline && slots.iter().any(|s| !s.handle.is_finished()) {
            std::thread::sleep(Duration::from_millis(50));
        }

        for slot in slots.drain(..) {
            if slot.handle.is_finished() {
                if slot.handle.join().is_err() {
                    error!("Worker {} terminated by panic", slot.id);
                } else {
                    info!("Worker {} stopped", slot.id);
                }
            } else {
                warn!("Worker {} did not stop within grace period, abandoning", slot.id);
            }
        }
        info!("All workers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats_snapshot(&self) -> ManagerStats {
        let slots = self.slots.lock().unwrap();
        ManagerStats {
            running: self.is_running(),
            workers_configured: self.worker_count,
            workers_alive: slots.iter().filter(|s| !s.handle.is_finished()).count(),
            restarts: self.restarts.load(Ordering::SeqCst),
            worker_totals: self.stats.snapshot(),
        }
    }

    pub fn health_check(&self) -> WorkerHealth {
        let slots = self.slots.lock().unwrap();
        let workers: Vec<WorkerHealthEntry> = slots
            .iter()
            .map(|s| WorkerHealthEntry {
                worker_id: s.id.clone(),
                alive: !s.handle.is_finished(),
            })
            .collect();

        WorkerHealth {
            manager_running: self.is_running(),
            workers_configured: self.worker_count,
            workers_alive: workers.iter().filter(|w| w.alive).count(),
            workers,
        }
    }
}
