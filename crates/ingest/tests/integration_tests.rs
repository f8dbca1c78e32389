//! Integration tests for the ingest crate
//!
//! These tests drive the full ingestion loop against a scripted in-memory
//! mailbox: cursor persistence, both processing modes, failure isolation,
//! and the documented at-least-once loss mode.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use ingest::extract::ExtractorSet;
use ingest::graph::{AttachmentMeta, AuthError, DeltaPage, FetchError, MailSource, SenderFilter};
use ingest::models::{AttachmentRecord, DeltaCursor, EmailAddress, EmailContext, Message, MessageId};
use ingest::queue::AttachmentQueue;
use ingest::storage::{ArtifactStore, CursorStore, TaskStatus};
use ingest::sync::{CycleOutcome, Monitor, MonitorStats};
use ingest::worker::{AttachmentWorker, ExtractionPipeline, WorkerStats};
use ingest::{MonitorConfig, ProcessingMode};
use tempfile::TempDir;

/// Minimal single-page PDF with one line of text
fn pdf_bytes(text: &str) -> Vec<u8> {
    use lopdf::{Dictionary, Object, Stream, dictionary};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET").into_bytes(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn make_message(id: &str, subject: &str, has_attachments: bool) -> Message {
    Message {
        id: MessageId::new(id),
        subject: subject.to_string(),
        from: EmailAddress::with_name("Billing", "billing@example.com"),
        received_at: Utc::now(),
        has_attachments,
        body_preview: "See attached".to_string(),
    }
}

/// What `download_attachment` should do for one attachment id
#[derive(Clone)]
enum Download {
    Bytes(Vec<u8>),
    Empty,
    Fail,
}

/// Scripted mailbox: a sequence of delta sweeps plus per-attachment
/// download behavior.
#[derive(Default)]
struct FakeMailbox {
    /// Consecutive `fetch_new_messages` results; the last entry repeats
    sweeps: Mutex<Vec<Result<DeltaPage, String>>>,
    attachments: HashMap<String, Vec<AttachmentMeta>>,
    downloads: HashMap<String, Download>,
    fetch_calls: AtomicUsize,
    seen_cursors: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeMailbox {
    fn new() -> Self {
        Self::default()
    }

    fn push_sweep(&self, messages: Vec<Message>, cursor: &str) {
        self.sweeps.lock().unwrap().push(Ok(DeltaPage {
            messages,
            cursor: Some(DeltaCursor::new(cursor)),
        }));
    }

    fn push_failing_sweep(&self, error: &str) {
        self.sweeps.lock().unwrap().push(Err(error.to_string()));
    }

    fn add_attachment(&mut self, message_id: &str, att_id: &str, name: &str, download: Download) {
        self.attachments
            .entry(message_id.to_string())
            .or_default()
            .push(AttachmentMeta {
                id: att_id.to_string(),
                name: name.to_string(),
                content_type: None,
                size: None,
            });
        self.downloads.insert(att_id.to_string(), download);
    }
}

impl MailSource for FakeMailbox {
    fn authenticate(&mut self) -> Result<(), AuthError> {
        Ok(())
    }

    fn fetch_new_messages(
        &self,
        cursor: Option<&DeltaCursor>,
        _filter: &SenderFilter,
    ) -> Result<DeltaPage, FetchError> {
        self.seen_cursors
            .lock()
            .unwrap()
            .push(cursor.map(|c| c.as_str().to_string()));

        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let sweeps = self.sweeps.lock().unwrap();
        let index = call.min(sweeps.len().saturating_sub(1));
        match sweeps.get(index) {
            Some(Ok(page)) => Ok(DeltaPage {
                messages: page.messages.clone(),
                cursor: page.cursor.clone(),
            }),
            Some(Err(e)) => Err(FetchError::Http(e.clone())),
            None => Ok(DeltaPage {
                messages: Vec::new(),
                cursor: None,
            }),
        }
    }

    fn list_attachments(&self, message_id: &MessageId) -> Result<Vec<AttachmentMeta>, FetchError> {
        Ok(self
            .attachments
            .get(message_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    fn download_attachment(
        &self,
        _message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError> {
        match self.downloads.get(attachment_id) {
            Some(Download::Bytes(bytes)) => Ok(bytes.clone()),
            Some(Download::Empty) => Ok(Vec::new()),
            Some(Download::Fail) => Err(FetchError::Http("simulated download failure".into())),
            None => Err(FetchError::Http("unknown attachment".into())),
        }
    }
}

fn make_config(dir: &TempDir, mode: ProcessingMode) -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 300,
        sender_groups: Vec::new(),
        allowed_extensions: vec![".pdf".into(), ".xlsx".into(), ".txt".into()],
        attachments_dir: dir.path().join("attachments"),
        results_dir: dir.path().join("results"),
        cursor_path: dir.path().join("cursor.txt"),
        mode,
        max_queue_len: 100,
        max_item_size: 10 * 1024 * 1024,
        worker_count: 1,
        worker_poll_secs: 1,
        max_retries: 3,
        temp_dir: dir.path().join("tmp"),
        shutdown_grace_secs: 1,
        upload_watch_dir: None,
    }
}

fn make_monitor(
    dir: &TempDir,
    mode: ProcessingMode,
    source: Box<dyn MailSource>,
    queue: Option<Arc<AttachmentQueue>>,
) -> Monitor {
    let config = make_config(dir, mode);
    let cursor_store = CursorStore::new(&config.cursor_path);
    let artifacts = ArtifactStore::new(&config.attachments_dir, &config.results_dir).unwrap();
    Monitor::new(
        config,
        source,
        cursor_store,
        ExtractorSet::with_default_extractors(),
        queue,
        artifacts,
        Arc::new(MonitorStats::new()),
    )
    .unwrap()
}

fn completed(outcome: CycleOutcome) -> ingest::sync::CycleStats {
    match outcome {
        CycleOutcome::Completed(stats) => stats,
        other => panic!("expected completed cycle, got {other:?}"),
    }
}

// === End-to-end scenarios ===

#[test]
fn test_direct_mode_end_to_end() {
    let dir = TempDir::new().unwrap();

    // Mailbox: one message with a PDF and a spreadsheet, one without
    // attachments.
    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(
        vec![
            make_message("msg-with", "Invoices attached", true),
            make_message("msg-without", "Just a note", false),
        ],
        "cursor-1",
    );
    mailbox.add_attachment(
        "msg-with",
        "att-pdf",
        "invoice.pdf",
        Download::Bytes(pdf_bytes("Invoice #: INV-42 Total: 99.00")),
    );
    mailbox.add_attachment(
        "msg-with",
        "att-xlsx",
        "figures.xlsx",
        // Not a real workbook: extraction degrades gracefully but the
        // attachment still counts as processed.
        Download::Bytes(b"PK\x03\x04 not really a workbook".to_vec()),
    );

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);
    let cycle = completed(monitor.run_cycle());

    assert_eq!(cycle.messages_fetched, 2);
    assert_eq!(cycle.messages_with_attachments, 1);
    assert_eq!(cycle.attachments_processed, 2);
    assert_eq!(cycle.attachments_skipped, 0);

    let snap = monitor.stats().snapshot();
    assert_eq!(snap.messages_processed, 2);
    assert_eq!(snap.attachments_processed, 2);

    // Exactly one processing summary, listing both attachments
    let artifacts = ArtifactStore::new(
        dir.path().join("attachments"),
        dir.path().join("results"),
    )
    .unwrap();
    let summaries = artifacts.recent_summaries(10);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["attachments_processed"], 2);
    assert_eq!(summaries[0]["email_info"]["message_id"], "msg-with");

    // Saved attachments and .processed.json sidecars exist
    let names: Vec<String> = std::fs::read_dir(dir.path().join("attachments"))
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.ends_with("_invoice.pdf")));
    assert!(names.iter().any(|n| n.ends_with("_invoice.pdf.processed.json")));
    assert!(names.iter().any(|n| n.ends_with("_figures.xlsx.processed.json")));

    // Cursor persisted before per-message work
    assert_eq!(
        CursorStore::new(dir.path().join("cursor.txt")).load().unwrap().as_str(),
        "cursor-1"
    );
}

#[test]
fn test_queue_mode_end_to_end_with_worker() {
    let dir = TempDir::new().unwrap();

    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(
        vec![
            make_message("msg-with", "Invoices attached", true),
            make_message("msg-without", "Just a note", false),
        ],
        "cursor-1",
    );
    mailbox.add_attachment(
        "msg-with",
        "att-pdf",
        "invoice.pdf",
        Download::Bytes(pdf_bytes("Invoice #: INV-7")),
    );
    mailbox.add_attachment(
        "msg-with",
        "att-txt",
        "notes.txt",
        Download::Bytes(b"plain notes".to_vec()),
    );

    let queue = Arc::new(AttachmentQueue::new("email_attachments", 100, 10 * 1024 * 1024));
    let monitor = make_monitor(
        &dir,
        ProcessingMode::Queue,
        Box::new(mailbox),
        Some(Arc::clone(&queue)),
    );

    let cycle = completed(monitor.run_cycle());
    assert_eq!(cycle.attachments_queued, 2);
    assert_eq!(cycle.attachments_processed, 0);
    assert_eq!(queue.len(), 2);

    let snap = monitor.stats().snapshot();
    assert_eq!(snap.messages_processed, 2);
    assert_eq!(snap.attachments_queued, 2);

    // One enqueue summary for the message with attachments
    let artifacts = ArtifactStore::new(
        dir.path().join("attachments"),
        dir.path().join("results"),
    )
    .unwrap();
    let summaries = artifacts.recent_summaries(10);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["attachments_enqueued"], 2);
    assert_eq!(summaries[0]["total_attachments"], 2);

    // A worker drains the queue and persists one result per task
    std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
    let worker = AttachmentWorker::new(
        "worker_1",
        Arc::clone(&queue),
        Arc::new(ExtractionPipeline::new(Arc::new(
            ExtractorSet::with_default_extractors(),
        ))),
        artifacts.clone(),
        Arc::new(WorkerStats::new()),
        Duration::from_millis(10),
        0,
        dir.path().join("tmp"),
    );
    while let Some(record) = queue.dequeue_blocking(Duration::from_millis(10)) {
        assert!(worker.process_record(&record));
    }

    let results = artifacts.recent_results(10);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == TaskStatus::Completed));
    assert!(queue.is_empty());
}

// === Cursor semantics ===

#[test]
fn test_cursor_resumes_and_never_redelivers() {
    let dir = TempDir::new().unwrap();

    let mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "First", false)], "cursor-1");
    // Unchanged mailbox afterwards: empty sweep, same cursor
    mailbox.push_sweep(Vec::new(), "cursor-1");

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);

    let first = completed(monitor.run_cycle());
    assert_eq!(first.messages_fetched, 1);

    let second = completed(monitor.run_cycle());
    assert_eq!(second.messages_fetched, 0, "no duplicate delivery");

    let cursor = CursorStore::new(dir.path().join("cursor.txt")).load().unwrap();
    assert_eq!(cursor.as_str(), "cursor-1");
}

#[test]
fn test_failed_fetch_leaves_cursor_untouched() {
    let dir = TempDir::new().unwrap();

    let mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "First", false)], "cursor-1");
    mailbox.push_failing_sweep("network down");

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);

    completed(monitor.run_cycle());
    let outcome = monitor.run_cycle();
    assert!(matches!(outcome, CycleOutcome::FetchFailed));

    // Cursor still points at the last successful sweep
    let cursor = CursorStore::new(dir.path().join("cursor.txt")).load().unwrap();
    assert_eq!(cursor.as_str(), "cursor-1");
    assert_eq!(monitor.stats().snapshot().errors, 1);
}

#[test]
fn test_second_cycle_submits_persisted_cursor() {
    let dir = TempDir::new().unwrap();

    let mailbox = FakeMailbox::new();
    mailbox.push_sweep(Vec::new(), "cursor-1");
    mailbox.push_sweep(Vec::new(), "cursor-2");
    let seen_cursors = Arc::clone(&mailbox.seen_cursors);

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);
    completed(monitor.run_cycle());
    completed(monitor.run_cycle());

    // The first sweep ran without a cursor, the second submitted cursor-1
    let seen = seen_cursors.lock().unwrap();
    assert_eq!(*seen, vec![None, Some("cursor-1".to_string())]);
    drop(seen);

    // The persisted cursor advanced across cycles
    let cursor = CursorStore::new(dir.path().join("cursor.txt")).load().unwrap();
    assert_eq!(cursor.as_str(), "cursor-2");
}

// === Failure isolation ===

#[test]
fn test_per_attachment_isolation() {
    let dir = TempDir::new().unwrap();

    // Three attachments; the second one fails to download
    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "Mixed bag", true)], "cursor-1");
    mailbox.add_attachment("m1", "att-1", "one.txt", Download::Bytes(b"first".to_vec()));
    mailbox.add_attachment("m1", "att-2", "two.txt", Download::Fail);
    mailbox.add_attachment("m1", "att-3", "three.txt", Download::Bytes(b"third".to_vec()));

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);
    let cycle = completed(monitor.run_cycle());

    assert_eq!(cycle.attachments_processed, 2, "attachments 1 and 3 processed");
    assert_eq!(cycle.attachments_skipped, 1);
    assert_eq!(cycle.errors, 0, "a skipped download is not a cycle error");

    // The message still counts exactly once
    assert_eq!(monitor.stats().snapshot().messages_processed, 1);

    let artifacts = ArtifactStore::new(
        dir.path().join("attachments"),
        dir.path().join("results"),
    )
    .unwrap();
    let summaries = artifacts.recent_summaries(10);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["attachments_processed"], 2);
}

#[test]
fn test_empty_download_is_skipped_not_saved() {
    let dir = TempDir::new().unwrap();

    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "Empty attachment", true)], "cursor-1");
    mailbox.add_attachment("m1", "att-1", "phantom.txt", Download::Empty);

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);
    let cycle = completed(monitor.run_cycle());

    assert_eq!(cycle.attachments_processed, 0);
    assert_eq!(cycle.attachments_skipped, 1);

    // No artifacts at all for this message
    let entries: Vec<_> = std::fs::read_dir(dir.path().join("attachments"))
        .unwrap()
        .flatten()
        .collect();
    assert!(entries.is_empty());
}

#[test]
fn test_extension_filter_applies_before_download() {
    let dir = TempDir::new().unwrap();

    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "Photos", true)], "cursor-1");
    // .jpg is not in the allow-list; Download::Fail would trip the test if
    // the filter did not short-circuit first
    mailbox.add_attachment("m1", "att-1", "photo.jpg", Download::Fail);
    mailbox.add_attachment("m1", "att-2", "doc.txt", Download::Bytes(b"kept".to_vec()));

    let monitor = make_monitor(&dir, ProcessingMode::Direct, Box::new(mailbox), None);
    let cycle = completed(monitor.run_cycle());

    assert_eq!(cycle.attachments_processed, 1);
    assert_eq!(cycle.attachments_skipped, 0, "filtered is not skipped");
}

// === At-least-once semantics ===

#[test]
fn test_crash_after_dequeue_loses_item_without_trace() {
    let dir = TempDir::new().unwrap();
    let queue = Arc::new(AttachmentQueue::new("email_attachments", 10, 1024 * 1024));

    let email = EmailContext {
        message_id: "m1".to_string(),
        subject: "Doomed".to_string(),
        sender_name: None,
        sender_address: "a@b.com".to_string(),
        body_preview: String::new(),
        received_at: Utc::now(),
    };
    let record = AttachmentRecord::new(email, "att-1", "doomed.txt", b"bytes".to_vec());
    queue.try_enqueue(&record).unwrap();

    // Simulate a worker crash between pop and result-commit: dequeue on a
    // thread that dies before doing anything with the record.
    let (tx, rx) = mpsc::channel();
    let crash_queue = Arc::clone(&queue);
    std::thread::spawn(move || {
        let item = crash_queue.dequeue_blocking(Duration::from_secs(1));
        tx.send(item.is_some()).unwrap();
        panic!("worker crashed before committing a result");
    })
    .join()
    .unwrap_err();
    assert!(rx.recv().unwrap(), "the item was dequeued before the crash");

    // Documented loss mode: the item does not reappear...
    assert_eq!(queue.len(), 0);
    // ...and no result artifact exists
    let artifacts = ArtifactStore::new(
        dir.path().join("attachments"),
        dir.path().join("results"),
    )
    .unwrap();
    assert!(artifacts.recent_results(10).is_empty());
}

// === Concurrency policy ===

#[test]
fn test_concurrent_trigger_is_rejected() {
    let dir = TempDir::new().unwrap();

    /// Mailbox that parks inside fetch until released, so the test can
    /// observe an in-flight cycle.
    struct ParkedMailbox {
        started: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl MailSource for ParkedMailbox {
        fn authenticate(&mut self) -> Result<(), AuthError> {
            Ok(())
        }

        fn fetch_new_messages(
            &self,
            _cursor: Option<&DeltaCursor>,
            _filter: &SenderFilter,
        ) -> Result<DeltaPage, FetchError> {
            self.started.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(DeltaPage {
                messages: Vec::new(),
                cursor: None,
            })
        }

        fn list_attachments(
            &self,
            _message_id: &MessageId,
        ) -> Result<Vec<AttachmentMeta>, FetchError> {
            Ok(Vec::new())
        }

        fn download_attachment(
            &self,
            _message_id: &MessageId,
            _attachment_id: &str,
        ) -> Result<Vec<u8>, FetchError> {
            Ok(Vec::new())
        }
    }

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mailbox = ParkedMailbox {
        started: started_tx,
        release: Mutex::new(release_rx),
    };

    let monitor = Arc::new(make_monitor(
        &dir,
        ProcessingMode::Direct,
        Box::new(mailbox),
        None,
    ));

    let background = Arc::clone(&monitor);
    let handle = std::thread::spawn(move || background.run_cycle());

    // Wait until the first cycle is provably inside fetch
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // A trigger while one cycle is in flight must be rejected, not run
    let outcome = monitor.run_cycle();
    assert!(matches!(outcome, CycleOutcome::AlreadyRunning));

    release_tx.send(()).unwrap();
    let first = handle.join().unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));
}

// === Queue/worker interplay ===

#[test]
fn test_oversized_attachment_rejected_but_rest_enqueued() {
    let dir = TempDir::new().unwrap();

    let mut mailbox = FakeMailbox::new();
    mailbox.push_sweep(vec![make_message("m1", "One huge file", true)], "cursor-1");
    mailbox.add_attachment("m1", "att-big", "huge.txt", Download::Bytes(vec![0u8; 2048]));
    mailbox.add_attachment("m1", "att-ok", "small.txt", Download::Bytes(b"ok".to_vec()));

    let queue = Arc::new(AttachmentQueue::new("email_attachments", 100, 1024));
    let mut config = make_config(&dir, ProcessingMode::Queue);
    config.max_item_size = 1024;
    let cursor_store = CursorStore::new(&config.cursor_path);
    let artifacts = ArtifactStore::new(&config.attachments_dir, &config.results_dir).unwrap();
    let monitor = Monitor::new(
        config,
        Box::new(mailbox),
        cursor_store,
        ExtractorSet::with_default_extractors(),
        Some(Arc::clone(&queue)),
        artifacts.clone(),
        Arc::new(MonitorStats::new()),
    )
    .unwrap();

    let cycle = completed(monitor.run_cycle());
    assert_eq!(cycle.attachments_queued, 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(monitor.stats().snapshot().queue_errors, 1);

    let summaries = artifacts.recent_summaries(10);
    assert_eq!(summaries[0]["total_attachments"], 2);
    assert_eq!(summaries[0]["attachments_enqueued"], 1);
}

#[test]
fn test_wire_format_survives_queue_round_trip() {
    let queue = AttachmentQueue::new("email_attachments", 10, 1024 * 1024);

    let email = EmailContext {
        message_id: "m1".to_string(),
        subject: "Binary safety".to_string(),
        sender_name: Some("Sender".to_string()),
        sender_address: "s@example.com".to_string(),
        body_preview: "preview".to_string(),
        received_at: Utc::now(),
    };
    let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let record = AttachmentRecord::new(email, "att-1", "blob.bin", content.clone());

    queue.try_enqueue(&record).unwrap();
    let back = queue.dequeue_blocking(Duration::from_millis(10)).unwrap();

    assert_eq!(back.content, content);
    assert_eq!(back.task_id, record.task_id);
    assert_eq!(back.email, record.email);
}
