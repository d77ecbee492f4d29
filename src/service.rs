//! Ingest service (C7): NDJSON parsing, enrichment, submission to the pool.
//!
//! Runs detached from the HTTP response — by the time this executes the
//! client has already received 202. A parse failure on one line never
//! affects the others; it is logged and the line is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::event::{Event, EventBatch};
use crate::worker::WorkerPool;

pub async fn process_event(body: &str, client_ip: &str, server_time: DateTime<Utc>, pool: &Arc<WorkerPool>) {
    let mut events = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(mut event) => {
                event.enrich(client_ip, server_time);
                events.push(event);
            }
            Err(err) => {
                warn!(error = %err, "skipping unparseable event line");
            }
        }
    }

    let Some(batch) = EventBatch::from_events(events) else {
        debug!("no parseable events in request body");
        return;
    };

    let count = batch.events.len();
    if let Err(err) = pool.process(&batch).await {
        warn!(error = %err, batch_id = %batch.id, count, "failed to submit batch to broker");
    }
}
