//! End-to-end coverage of the worker pool using in-process fakes for the
//! broker and store, per the testable-properties scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use eventline::config::WorkerConfig;
use eventline::event::{Event, EventBatch, FailurePayload};
use eventline::queue::{ConsumerEvent, ErrorSink, EventQueue, QueueError};
use eventline::service::process_event;
use eventline::store::{StoreError, StoreWriter};
use eventline::worker::WorkerPool;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Round-trips published batches back out through `consume`, standing in
/// for a real broker round-trip in process.
struct LoopbackQueue {
    tx: mpsc::UnboundedSender<EventBatch>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<EventBatch>>>,
}

impl LoopbackQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl EventQueue for LoopbackQueue {
    async fn publish(&self, _cancel: &CancellationToken, batch: &EventBatch) -> Result<(), QueueError> {
        self.tx.send(batch.clone()).map_err(|_| QueueError::Cancelled)
    }

    async fn consume(
        &self,
        out: mpsc::Sender<EventBatch>,
        _errors: mpsc::Sender<ConsumerEvent>,
        cancel: CancellationToken,
    ) {
        let mut rx = self.rx.lock().await.take().expect("consume invoked once");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe = rx.recv() => {
                    match maybe {
                        Some(batch) => {
                            if out.send(batch).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

struct RecordingErrorSink {
    failures: Mutex<Vec<FailurePayload>>,
}

impl RecordingErrorSink {
    fn new() -> Self {
        Self {
            failures: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ErrorSink for RecordingErrorSink {
    async fn publish_failure(
        &self,
        _cancel: &CancellationToken,
        failure: &FailurePayload,
    ) -> Result<(), QueueError> {
        self.failures.lock().await.push(failure.clone());
        Ok(())
    }
}

struct RecordingWriter {
    inserts: AtomicUsize,
    rows: Mutex<Vec<Event>>,
    fail_first_n: usize,
}

impl RecordingWriter {
    fn new() -> Self {
        Self {
            inserts: AtomicUsize::new(0),
            rows: Mutex::new(Vec::new()),
            fail_first_n: 0,
        }
    }

    fn failing_first(n: usize) -> Self {
        Self {
            inserts: AtomicUsize::new(0),
            rows: Mutex::new(Vec::new()),
            fail_first_n: n,
        }
    }
}

#[async_trait]
impl StoreWriter for RecordingWriter {
    async fn store_events(&self, _cancel: &CancellationToken, events: &[Event]) -> Result<(), StoreError> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first_n {
            return Err(StoreError::Connection("store unavailable".to_string()));
        }
        self.rows.lock().await.extend_from_slice(events);
        Ok(())
    }
}

fn body_with(lines: &[(&str, i64)]) -> String {
    lines
        .iter()
        .map(|(device, seq)| {
            format!(
                r#"{{"client_time":"2024-01-01T00:00:00Z","device_id":"{device}","device_os":"ios","session":"s","event":"open","param_str":"","sequence":{seq},"param_int":0}}"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sample_event(device_id: &str) -> Event {
    Event {
        server_time: Utc::now(),
        ip: "203.0.113.5".to_string(),
        client_time: "2024-01-01T00:00:00Z".to_string(),
        device_id: device_id.to_string(),
        device_os: "ios".to_string(),
        session: "s".to_string(),
        event: "open".to_string(),
        param_str: String::new(),
        sequence: 1,
        param_int: 0,
    }
}

#[tokio::test]
async fn happy_path_batch_flushes_at_threshold() {
    let writer = Arc::new(RecordingWriter::new());
    let pool = Arc::new(WorkerPool::new(
        Arc::new(LoopbackQueue::new()),
        Arc::new(RecordingErrorSink::new()),
        writer.clone(),
        WorkerConfig {
            num_workers: 1,
            batch_size: 2,
            max_batch_capacity: 30,
        },
    ));
    pool.start();

    let body = body_with(&[("device-a", 1), ("device-b", 2)]);
    process_event(&body, "203.0.113.5", Utc::now(), &pool).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let rows = writer.rows.lock().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].device_id, "device-a");
    assert_eq!(rows[1].device_id, "device-b");
    drop(rows);

    pool.graceful_stop().await;
    assert_eq!(writer.inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_line_does_not_block_the_rest_and_survives_shutdown() {
    let writer = Arc::new(RecordingWriter::new());
    let pool = Arc::new(WorkerPool::new(
        Arc::new(LoopbackQueue::new()),
        Arc::new(RecordingErrorSink::new()),
        writer.clone(),
        WorkerConfig {
            num_workers: 1,
            batch_size: 1000,
            max_batch_capacity: 30,
        },
    ));
    pool.start();

    let body = format!("not json\n{}", body_with(&[("device-a", 1)]));
    process_event(&body, "203.0.113.5", Utc::now(), &pool).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.graceful_stop().await;

    let rows = writer.rows.lock().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].device_id, "device-a");
}

#[tokio::test]
async fn store_outage_routes_failed_batch_to_dead_letter_sink() {
    let error_sink = Arc::new(RecordingErrorSink::new());
    let writer = Arc::new(RecordingWriter::failing_first(usize::MAX));
    let pool = Arc::new(WorkerPool::new(
        Arc::new(LoopbackQueue::new()),
        error_sink.clone(),
        writer,
        WorkerConfig {
            num_workers: 1,
            batch_size: 2,
            max_batch_capacity: 30,
        },
    ));
    pool.start();

    let batch = EventBatch::from_events(vec![sample_event("device-a"), sample_event("device-b")]).unwrap();
    pool.process(&batch).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.graceful_stop().await;

    let failures = error_sink.failures.lock().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].payload.events.len(), 2);
    assert!(failures[0].error_reason.is_some());
}

#[tokio::test]
async fn start_and_stop_are_idempotent_under_concurrent_invocation() {
    let pool = Arc::new(WorkerPool::new(
        Arc::new(LoopbackQueue::new()),
        Arc::new(RecordingErrorSink::new()),
        Arc::new(RecordingWriter::new()),
        WorkerConfig {
            num_workers: 4,
            batch_size: 1000,
            max_batch_capacity: 30,
        },
    ));

    let (a, b) = (pool.clone(), pool.clone());
    tokio::join!(async move { a.start() }, async move { b.start() });

    let (a, b) = (pool.clone(), pool.clone());
    tokio::join!(a.graceful_stop(), b.graceful_stop());
}

#[tokio::test]
async fn readiness_and_empty_body_are_inert() {
    let pool = Arc::new(WorkerPool::new(
        Arc::new(LoopbackQueue::new()),
        Arc::new(RecordingErrorSink::new()),
        Arc::new(RecordingWriter::new()),
        WorkerConfig {
            num_workers: 1,
            batch_size: 1000,
            max_batch_capacity: 30,
        },
    ));
    pool.start();

    process_event("", "203.0.113.5", Utc::now(), &pool).await;
    pool.graceful_stop().await;
}
