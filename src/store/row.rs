//! Domain-to-columnar row mapping, including the narrowing cast at the
//! store boundary (C6, see `Event::sequence`/`Event::param_int`).

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;

use crate::event::Event;

#[derive(Debug, Clone, Serialize, Row)]
pub struct EventRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub client_time: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub server_time: DateTime<Utc>,
    pub ip: String,
    pub device_id: String,
    pub device_os: String,
    pub session: String,
    pub sequence: i16,
    pub event_type: String,
    pub param_int: i32,
    pub param_str: String,
}

impl From<&Event> for EventRow {
    /// Parses `client_time` as RFC 3339, falling back to the server time on
    /// failure — a malformed client timestamp must not fail the whole batch.
    /// `sequence`/`param_int` narrow silently; out-of-range values wrap per
    /// the target type's `as` conversion, matching the store boundary's
    /// documented lossy cast.
    fn from(event: &Event) -> Self {
        let client_time = DateTime::parse_from_rfc3339(&event.client_time)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(event.server_time);

        Self {
            client_time,
            server_time: event.server_time,
            ip: event.ip.clone(),
            device_id: event.device_id.clone(),
            device_os: event.device_os.clone(),
            session: event.session.clone(),
            sequence: event.sequence as i16,
            event_type: event.event.clone(),
            param_int: event.param_int as i32,
            param_str: event.param_str.clone(),
        }
    }
}
