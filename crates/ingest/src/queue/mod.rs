//! Bounded FIFO queue for attachment records
//!
//! The queue is the single hand-off point between the ingestion loop
//! (single producer) and the worker pool (competing consumers). Items are
//! self-contained serialized records (JSON with base64 content) so a
//! consumer never needs state from the producing cycle.
//!
//! Delivery is at-least-once: a pop is destructive, and a worker that dies
//! between pop and result-commit loses the item. That trade-off is
//! deliberate; see the crate docs.

use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::models::AttachmentRecord;

/// Enqueue rejection.
///
/// Rejections are terminal: the attachment is dropped and counted, never
/// retried automatically.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("attachment is {size} bytes, queue admits at most {max}")]
    ItemTooLarge { size: u64, max: u64 },
    #[error("queue is full ({len}/{max} items)")]
    Full { len: usize, max: usize },
    #[error("record could not be serialized: {0}")]
    Unserializable(String),
}

/// Aggregate queue statistics for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub max_queue_size: usize,
    pub sample_size: usize,
    pub avg_attachment_size: f64,
    pub file_type_distribution: HashMap<String, usize>,
    pub queue_utilization: f64,
}

/// Queue health probe result
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub queue_accessible: bool,
    pub queue_length: usize,
}

/// Bounded in-process FIFO of serialized attachment records.
///
/// Admission control: items larger than `max_item_size` and enqueues at
/// `max_len` are rejected. The size check is best-effort; under concurrent
/// producers the queue may transiently exceed its bound by a small margin,
/// which is not correctness-critical.
pub struct AttachmentQueue {
    name: String,
    max_len: usize,
    max_item_size: u64,
    items: Mutex<VecDeque<String>>,
    available: Condvar,
}

impl AttachmentQueue {
    pub fn new(name: impl Into<String>, max_len: usize, max_item_size: u64) -> Self {
        Self {
            name: name.into(),
            max_len,
            max_item_size,
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admit one record.
    ///
    /// Boundary semantics: a record of exactly `max_item_size` bytes is
    /// admitted; one byte more is rejected. An enqueue when the queue holds
    /// `max_len` items is rejected.
    pub fn try_enqueue(&self, record: &AttachmentRecord) -> Result<(), EnqueueError> {
        if record.size > self.max_item_size {
            return Err(EnqueueError::ItemTooLarge {
                size: record.size,
                max: self.max_item_size,
            });
        }

        let serialized = record
            .to_json()
            .map_err(|e| EnqueueError::Unserializable(e.to_string()))?;

        let mut items = self.items.lock().unwrap();
        if items.len() >= self.max_len {
            return Err(EnqueueError::Full {
                len: items.len(),
                max: self.max_len,
            });
        }

        items.push_back(serialized);
        drop(items);
        self.available.notify_one();
        Ok(())
    }

    /// Admit a batch of records, returning how many were accepted.
    ///
    /// Each record is validated independently. When the whole batch would
    /// overflow the queue, members are admitted one-by-one until the limit
    /// is hit rather than rejecting the batch outright.
    pub fn enqueue_batch(&self, records: &[AttachmentRecord]) -> usize {
        let mut admitted = 0;
        for record in records {
            match self.try_enqueue(record) {
                Ok(()) => admitted += 1,
                Err(e) => {
                    warn!("Rejected {}: {e}", record.describe());
                    if matches!(e, EnqueueError::Full { .. }) {
                        // Later records cannot fit either
                        break;
                    }
                }
            }
        }
        admitted
    }

    /// Pop the oldest record, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout so workers can check for shutdown. The pop
    /// is destructive: once returned, the item is gone regardless of what
    /// the caller does with it.
    pub fn dequeue_blocking(&self, timeout: Duration) -> Option<AttachmentRecord> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock().unwrap();

        loop {
            if let Some(raw) = items.pop_front() {
                match AttachmentRecord::from_json(&raw) {
                    Ok(record) => return Some(record),
                    Err(e) => {
                        // Malformed item: drop it and keep draining
                        warn!("Dropping unparsable queue item: {e}");
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (guard, result) = self
                .available
                .wait_timeout(items, deadline - now)
                .unwrap();
            items = guard;
            if result.timed_out() && items.is_empty() {
                return None;
            }
        }
    }

    /// Preview the oldest `count` items without removing them.
    ///
    /// Attachment content is elided to keep the preview readable.
    pub fn peek(&self, count: usize) -> Vec<serde_json::Value> {
        let items = self.items.lock().unwrap();
        items
            .iter()
            .take(count)
            .filter_map(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .map(|mut value| {
                if let Some(content) = value.get_mut("content") {
                    let elided = match content.as_str() {
                        Some(s) => format!("<{} base64 chars>", s.len()),
                        None => "<binary>".to_string(),
                    };
                    *content = serde_json::Value::String(elided);
                }
                value
            })
            .collect()
    }

    /// Remove all items, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock().unwrap();
        let removed = items.len();
        items.clear();
        info!("Cleared {removed} items from queue {}", self.name);
        removed
    }

    /// Detailed statistics, sampling the oldest items for sizes and types.
    pub fn stats(&self) -> QueueStats {
        let items = self.items.lock().unwrap();
        let queue_length = items.len();

        let mut total_size = 0u64;
        let mut file_types: HashMap<String, usize> = HashMap::new();
        let mut sampled = 0usize;

        for raw in items.iter().take(10) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
                continue;
            };
            sampled += 1;
            total_size += value.get("size").and_then(|s| s.as_u64()).unwrap_or(0);

            let ext = value
                .get("filename")
                .and_then(|f| f.as_str())
                .and_then(|f| f.rfind('.').map(|i| f[i..].to_lowercase()))
                .unwrap_or_default();
            *file_types.entry(ext).or_insert(0) += 1;
        }

        QueueStats {
            queue_length,
            max_queue_size: self.max_len,
            sample_size: sampled,
            avg_attachment_size: if sampled > 0 {
                total_size as f64 / sampled as f64
            } else {
                0.0
            },
            file_type_distribution: file_types,
            queue_utilization: if self.max_len > 0 {
                queue_length as f64 / self.max_len as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Cheap liveness probe for the status surface
    pub fn health_check(&self) -> QueueHealth {
        QueueHealth {
            queue_accessible: true,
            queue_length: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailContext;
    use chrono::Utc;
    use std::sync::Arc;

    fn make_record(filename: &str, content: Vec<u8>) -> AttachmentRecord {
        let email = EmailContext {
            message_id: "msg-1".to_string(),
            subject: "Test".to_string(),
            sender_name: None,
            sender_address: "a@b.com".to_string(),
            body_preview: String::new(),
            received_at: Utc::now(),
        };
        AttachmentRecord::new(email, "att-1", filename, content)
    }

    #[test]
    fn test_fifo_order() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        queue.try_enqueue(&make_record("first.txt", vec![1])).unwrap();
        queue.try_enqueue(&make_record("second.txt", vec![2])).unwrap();

        let a = queue.dequeue_blocking(Duration::from_millis(10)).unwrap();
        let b = queue.dequeue_blocking(Duration::from_millis(10)).unwrap();
        assert_eq!(a.filename, "first.txt");
        assert_eq!(b.filename, "second.txt");
    }

    #[test]
    fn test_item_size_boundary() {
        let queue = AttachmentQueue::new("test", 10, 8);

        // Exactly at the limit: admitted
        let at_limit = make_record("ok.bin", vec![0u8; 8]);
        assert!(queue.try_enqueue(&at_limit).is_ok());

        // One byte over: rejected
        let over = make_record("big.bin", vec![0u8; 9]);
        assert_eq!(
            queue.try_enqueue(&over),
            Err(EnqueueError::ItemTooLarge { size: 9, max: 8 })
        );
    }

    #[test]
    fn test_queue_length_boundary() {
        let queue = AttachmentQueue::new("test", 2, 1024);
        assert!(queue.try_enqueue(&make_record("a.txt", vec![1])).is_ok());
        // At max_len - 1: admitted, bringing the queue to max_len
        assert!(queue.try_enqueue(&make_record("b.txt", vec![2])).is_ok());
        assert_eq!(queue.len(), 2);
        // At max_len: rejected
        assert_eq!(
            queue.try_enqueue(&make_record("c.txt", vec![3])),
            Err(EnqueueError::Full { len: 2, max: 2 })
        );
    }

    #[test]
    fn test_batch_falls_back_to_individual_admission() {
        let queue = AttachmentQueue::new("test", 3, 1024);
        queue.try_enqueue(&make_record("seed.txt", vec![0])).unwrap();

        let batch: Vec<_> = (0..4)
            .map(|i| make_record(&format!("item{i}.txt"), vec![i as u8]))
            .collect();

        // Only two slots remain; the batch is admitted member-by-member
        let admitted = queue.enqueue_batch(&batch);
        assert_eq!(admitted, 2);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_batch_skips_oversized_but_continues() {
        let queue = AttachmentQueue::new("test", 10, 4);
        let batch = vec![
            make_record("small.txt", vec![1, 2]),
            make_record("huge.bin", vec![0u8; 64]),
            make_record("tiny.txt", vec![3]),
        ];
        assert_eq!(queue.enqueue_batch(&batch), 2);
    }

    #[test]
    fn test_dequeue_timeout_returns_none() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        let start = Instant::now();
        assert!(queue.dequeue_blocking(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(AttachmentQueue::new("test", 10, 1024));
        let producer = Arc::clone(&queue);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.try_enqueue(&make_record("late.txt", vec![7])).unwrap();
        });

        let record = queue.dequeue_blocking(Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(record.unwrap().filename, "late.txt");
    }

    #[test]
    fn test_pop_is_destructive() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        queue.try_enqueue(&make_record("once.txt", vec![1])).unwrap();

        let record = queue.dequeue_blocking(Duration::from_millis(10));
        assert!(record.is_some());
        // The item never reappears, even though no result was committed
        assert_eq!(queue.len(), 0);
        assert!(queue.dequeue_blocking(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        let content: Vec<u8> = (0..=255u8).collect();
        queue
            .try_enqueue(&make_record("all-bytes.bin", content.clone()))
            .unwrap();

        let record = queue.dequeue_blocking(Duration::from_millis(10)).unwrap();
        assert_eq!(record.content, content);
    }

    #[test]
    fn test_peek_elides_content_and_keeps_items() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        queue
            .try_enqueue(&make_record("doc.pdf", vec![0u8; 100]))
            .unwrap();

        let preview = queue.peek(5);
        assert_eq!(preview.len(), 1);
        let content = preview[0].get("content").unwrap().as_str().unwrap();
        assert!(content.starts_with('<'), "content should be elided: {content}");
        assert_eq!(preview[0].get("filename").unwrap(), "doc.pdf");
        // Non-destructive
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear() {
        let queue = AttachmentQueue::new("test", 10, 1024);
        queue.try_enqueue(&make_record("a.txt", vec![1])).unwrap();
        queue.try_enqueue(&make_record("b.txt", vec![2])).unwrap();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stats_histogram_and_utilization() {
        let queue = AttachmentQueue::new("test", 4, 1024);
        queue.try_enqueue(&make_record("a.pdf", vec![0u8; 10])).unwrap();
        queue.try_enqueue(&make_record("b.pdf", vec![0u8; 20])).unwrap();
        queue.try_enqueue(&make_record("c.xlsx", vec![0u8; 30])).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.queue_length, 3);
        assert_eq!(stats.sample_size, 3);
        assert_eq!(stats.file_type_distribution.get(".pdf"), Some(&2));
        assert_eq!(stats.file_type_distribution.get(".xlsx"), Some(&1));
        assert!((stats.avg_attachment_size - 20.0).abs() < f64::EPSILON);
        assert!((stats.queue_utilization - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_check() {
        let queue = AttachmentQueue::new("test", 4, 1024);
        let health = queue.health_check();
        assert!(health.queue_accessible);
        assert_eq!(health.queue_length, 0);
    }

    #[test]
    fn test_competing_consumers_each_get_distinct_items() {
        let queue = Arc::new(AttachmentQueue::new("test", 100, 1024));
        for i in 0..20 {
            queue
                .try_enqueue(&make_record(&format!("item{i}.txt"), vec![i as u8]))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(record) = q.dequeue_blocking(Duration::from_millis(20)) {
                    seen.push(record.filename);
                }
                seen
            }));
        }

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20, "every item consumed exactly once");
        assert!(queue.is_empty());
    }
}
