//! Accumulator-variant worker pool (C5) — the heart of the dataplane.
//!
//! Workers drain a broker-fed channel, coalesce events into store-sized
//! batches, and flush them through the store writer. The terminal flush on
//! shutdown runs under a freshly constructed, never-cancelled token: using
//! the pool's own token there would make the insert itself racy against the
//! very cancellation that triggered it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::WorkerConfig;
use crate::event::{Event, EventBatch};
use crate::queue::{ConsumerEvent, ErrorSink, EventQueue};
use crate::store::StoreWriter;
use crate::worker::error::WorkerError;

pub struct WorkerPool {
    queue: Arc<dyn EventQueue>,
    error_sink: Arc<dyn ErrorSink>,
    writer: Arc<dyn StoreWriter>,
    config: WorkerConfig,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
    fatal: StdMutex<Option<String>>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        error_sink: Arc<dyn ErrorSink>,
        writer: Arc<dyn StoreWriter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            error_sink,
            writer,
            config,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fatal: StdMutex::new(None),
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// Publish a batch produced by the ingest path. On failure the batch is
    /// routed to the dead-letter sink before the error is surfaced.
    pub async fn process(&self, batch: &EventBatch) -> Result<(), WorkerError> {
        match self.queue.publish(&self.cancel, batch).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.on_failure(batch.clone(), &err).await;
                Err(WorkerError::from(err))
            }
        }
    }

    /// Launch the consumer task and `num_workers` worker tasks. A second
    /// call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let num_workers = self.config.num_workers.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel::<EventBatch>(num_workers);
        let inbound_rx = Arc::new(AsyncMutex::new(inbound_rx));
        let (err_tx, err_rx) = mpsc::channel::<ConsumerEvent>(32);

        let mut handles = self.handles.lock().unwrap();

        {
            let pool = Arc::clone(self);
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                pool.queue.consume(inbound_tx, err_tx, cancel).await;
            }));
        }

        {
            let pool = Arc::clone(self);
            handles.push(tokio::spawn(pool.watch_errors(err_rx)));
        }

        for worker_id in 0..num_workers {
            let pool = Arc::clone(self);
            let rx = Arc::clone(&inbound_rx);
            handles.push(tokio::spawn(pool.worker_loop(worker_id, rx)));
        }

        debug!(num_workers, "worker pool started");
    }

    /// Signal cancellation and wait for every spawned task to exit. A second
    /// call is a no-op and returns immediately.
    pub async fn graceful_stop(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task panicked");
            }
        }
        debug!("worker pool stopped");
    }

    /// The reason the consumer terminated fatally, if it has.
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().unwrap().clone()
    }

    async fn watch_errors(self: Arc<Self>, mut err_rx: mpsc::Receiver<ConsumerEvent>) {
        while let Some(event) = err_rx.recv().await {
            match event {
                ConsumerEvent::Transient(err) => {
                    warn!(error = %err, "transient consumer error");
                }
                ConsumerEvent::Fatal(err) => {
                    error!(error = %err, "consumer terminated fatally");
                    *self.fatal.lock().unwrap() = Some(err.to_string());
                    self.cancel.cancel();
                    return;
                }
            }
        }
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        inbound: Arc<AsyncMutex<mpsc::Receiver<EventBatch>>>,
    ) {
        let mut accumulator: Vec<Event> = Vec::with_capacity(self.config.batch_size);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.terminal_flush(worker_id, &mut accumulator).await;
                    return;
                }
                maybe_batch = async { inbound.lock().await.recv().await } => {
                    match maybe_batch {
                        None => {
                            self.terminal_flush(worker_id, &mut accumulator).await;
                            return;
                        }
                        Some(batch) => {
                            accumulator.extend(batch.events);
                            if accumulator.len() >= self.config.batch_size {
                                self.flush(worker_id, &mut accumulator).await;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn flush(&self, worker_id: usize, accumulator: &mut Vec<Event>) {
        if accumulator.is_empty() {
            return;
        }
        let events = accumulator.split_off(0);
        self.flush_events(worker_id, events, &self.cancel).await;
        self.reset_accumulator(accumulator);
    }

    /// Reallocate when the configured capacity has grown past what this
    /// accumulator holds; otherwise keep the vector `split_off` already
    /// drained down to length zero, preserving its capacity.
    fn reset_accumulator(&self, accumulator: &mut Vec<Event>) {
        if self.config.max_batch_capacity > accumulator.capacity() {
            *accumulator = Vec::with_capacity(self.config.batch_size);
        }
    }

    async fn terminal_flush(&self, worker_id: usize, accumulator: &mut Vec<Event>) {
        if accumulator.is_empty() {
            return;
        }
        let events = accumulator.split_off(0);
        let fresh = CancellationToken::new();
        self.flush_events(worker_id, events, &fresh).await;
    }

    async fn flush_events(&self, worker_id: usize, events: Vec<Event>, ctx: &CancellationToken) {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let count = events.len();
        match self.writer.store_events(ctx, &events).await {
            Ok(()) => {
                debug!(worker_id, batch_id = %batch_id, count, "flushed batch to store");
            }
            Err(err) => {
                warn!(worker_id, batch_id = %batch_id, error = %err, "store write failed");
                if let Some(failed) = EventBatch::with_id(batch_id, events) {
                    self.on_failure(failed, &err).await;
                }
            }
        }
    }

    /// Construct a `FailurePayload` and publish it to the dead-letter sink
    /// under a detached, never-cancelled context so shutdown never races a
    /// failure report. A failed publish here is logged, not propagated —
    /// forward progress of the pool must never block on it.
    async fn on_failure(&self, batch: EventBatch, err: &(dyn std::fmt::Display + Send + Sync)) {
        let failure = crate::event::FailurePayload::new(batch, err);
        let fresh = CancellationToken::new();
        if let Err(e) = self.error_sink.publish_failure(&fresh, &failure).await {
            error!(error = %e, "failed to publish to dead-letter sink");
        }
    }
}
