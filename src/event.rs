//! Canonical event record and batch shape (C1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single ingested event, enriched with server-assigned metadata.
///
/// `sequence` and `param_int` are kept wide (`i64`) on the wire and in this
/// domain type; the narrowing to `int16`/`int32` happens only at the store
/// boundary (see `store::row::EventRow`), matching the original system's
/// silent-narrowing-on-insert behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub server_time: DateTime<Utc>,
    #[serde(default)]
    pub ip: String,
    pub client_time: String,
    pub device_id: String,
    pub device_os: String,
    pub session: String,
    pub event: String,
    pub param_str: String,
    pub sequence: i64,
    pub param_int: i64,
}

impl Event {
    /// Assign the two server-supplied fields. Idempotent; does not validate
    /// the client-supplied fields.
    pub fn enrich(&mut self, client_ip: &str, server_time: DateTime<Utc>) {
        self.ip = client_ip.to_string();
        self.server_time = server_time;
    }
}

/// A non-empty, ordered group of events moving through the pipeline as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub id: String,
    pub events: Vec<Event>,
}

impl EventBatch {
    /// Build a batch from a non-empty vector, deriving `id` from the first
    /// event's `device_id` as the HTTP ingest path does.
    ///
    /// Returns `None` for an empty vector — empty batches never traverse the
    /// pipeline.
    pub fn from_events(events: Vec<Event>) -> Option<Self> {
        let id = events.first()?.device_id.clone();
        Some(Self { id, events })
    }

    /// Build a batch with an explicit id, as the worker accumulator does
    /// when flushing (see `worker::pool`).
    pub fn with_id(id: impl Into<String>, events: Vec<Event>) -> Option<Self> {
        if events.is_empty() {
            return None;
        }
        Some(Self {
            id: id.into(),
            events,
        })
    }
}

/// Dead-letter record: the batch that failed to persist, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePayload {
    pub payload: EventBatch,
    pub error_reason: Option<String>,
}

impl FailurePayload {
    pub fn new(payload: EventBatch, error: impl std::fmt::Display) -> Self {
        Self {
            payload,
            error_reason: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(device_id: &str) -> Event {
        Event {
            server_time: DateTime::<Utc>::default(),
            ip: String::new(),
            client_time: "2024-01-01T00:00:00Z".to_string(),
            device_id: device_id.to_string(),
            device_os: "ios".to_string(),
            session: "sess-1".to_string(),
            event: "app_open".to_string(),
            param_str: String::new(),
            sequence: 1,
            param_int: 0,
        }
    }

    #[test]
    fn enrich_sets_ip_and_server_time() {
        let mut event = sample_event("device-a");
        let now = Utc::now();
        event.enrich("203.0.113.5", now);
        assert_eq!(event.ip, "203.0.113.5");
        assert_eq!(event.server_time, now);
    }

    #[test]
    fn batch_from_events_derives_id_from_first_device() {
        let events = vec![sample_event("device-a"), sample_event("device-b")];
        let batch = EventBatch::from_events(events).unwrap();
        assert_eq!(batch.id, "device-a");
        assert_eq!(batch.events.len(), 2);
    }

    #[test]
    fn batch_from_events_rejects_empty() {
        assert!(EventBatch::from_events(Vec::new()).is_none());
    }

    #[test]
    fn with_id_rejects_empty() {
        assert!(EventBatch::with_id("fresh-id", Vec::new()).is_none());
    }

    #[test]
    fn failure_payload_captures_reason() {
        let batch = EventBatch::from_events(vec![sample_event("device-a")]).unwrap();
        let failure = FailurePayload::new(batch, "insert timed out");
        assert_eq!(failure.error_reason.as_deref(), Some("insert timed out"));
    }
}
