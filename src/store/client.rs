//! Process-wide columnar store client (C6).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClickhouseConfig;
use crate::event::Event;
use crate::store::error::StoreError;
use crate::store::row::EventRow;

const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    client_time DateTime64(3),
    server_time DateTime64(3),
    ip String,
    device_id String,
    device_os String,
    session String,
    sequence Int16,
    event_type String,
    param_int Int32,
    param_str String
)
ENGINE = MergeTree
ORDER BY server_time
"#;

/// Bounds documented against the underlying HTTP transport's connection
/// pool: max 5 open, max 5 idle, 10 minute max lifetime. The `clickhouse`
/// client version in use here does not expose these as independent knobs;
/// kept as named constants so the intent is visible and easy to wire up if
/// a future client version adds the hook.
#[allow(dead_code)]
mod pool_bounds {
    pub const MAX_OPEN: usize = 5;
    pub const MAX_IDLE: usize = 5;
    pub const MAX_LIFETIME_SECS: u64 = 600;
}

#[async_trait]
pub trait StoreWriter: Send + Sync {
    async fn store_events(
        &self,
        cancel: &CancellationToken,
        events: &[Event],
    ) -> Result<(), StoreError>;
}

pub struct Store {
    client: clickhouse::Client,
}

impl Store {
    pub fn new(config: &ClickhouseConfig) -> Self {
        let client = clickhouse::Client::default()
            .with_url(format!("http://{}", config.addr))
            .with_database(&config.db)
            .with_user(&config.username)
            .with_password(&config.password);

        Self { client }
    }

    /// Idempotent DDL, run once at startup before any traffic is accepted.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        self.client
            .query(CREATE_EVENTS_TABLE)
            .execute()
            .await
            .map_err(StoreError::Migration)?;
        info!("events table migration applied");
        Ok(())
    }
}

#[async_trait]
impl StoreWriter for Store {
    /// Single round-trip insert of the whole batch. `cancel` is accepted for
    /// symmetry with the rest of the pipeline's cancellable operations; the
    /// underlying client does not currently expose mid-insert cancellation,
    /// so it is checked only before the call begins.
    async fn store_events(
        &self,
        cancel: &CancellationToken,
        events: &[Event],
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Connection("cancelled before insert".to_string()));
        }

        let mut insert = self
            .client
            .insert::<EventRow>("events")
            .map_err(StoreError::Insert)?;

        for event in events {
            insert
                .write(&EventRow::from(event))
                .await
                .map_err(StoreError::Insert)?;
        }
        insert.end().await.map_err(StoreError::Insert)?;

        debug!(rows = events.len(), "inserted event batch");
        Ok(())
    }
}
