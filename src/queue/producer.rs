//! Broker publisher with bounded linear retry (C2).

use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProducerConfig;
use crate::queue::error::QueueError;

const PER_ATTEMPT_DEADLINE: Duration = Duration::from_secs(5);

pub struct Producer {
    client: FutureProducer,
    topic: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl Producer {
    pub fn new(config: &ProducerConfig) -> Result<Self, QueueError> {
        Self::with_topic(config, config.topic.clone())
    }

    /// Build a producer targeting an arbitrary topic, sharing the same
    /// broker list and retry policy — used to construct the dead-letter
    /// producer against `error_topic`.
    pub fn with_topic(config: &ProducerConfig, topic: String) -> Result<Self, QueueError> {
        let client: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| QueueError::ClientConfig(e.to_string()))?;

        Ok(Self {
            client,
            topic,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        })
    }

    /// Serialize `value`, address it by `key`, and submit it to the broker
    /// under bounded linear retry. Delay before attempt `i` (1-indexed) is
    /// `retry_delay * i`. Cancellation aborts immediately with no further
    /// retries; any other error counts as a failed attempt.
    pub async fn publish<T: serde::Serialize>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &T,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(value).expect("EventBatch serialization is infallible");

        let mut last_err = None;
        for attempt in 1..=self.retry_attempts.max(1) {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            if attempt > 1 {
                let delay = self.retry_delay * (attempt - 1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                }
            }

            let record = FutureRecord::to(&self.topic).key(key).payload(&payload);
            match self.client.send(record, PER_ATTEMPT_DEADLINE).await {
                Ok((partition, offset)) => {
                    debug!(topic = %self.topic, partition, offset, attempt, "published batch");
                    return Ok(());
                }
                Err((err, _)) => {
                    warn!(topic = %self.topic, attempt, error = %err, "publish attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(QueueError::PublishFailed {
            attempts: self.retry_attempts,
            source: last_err.expect("loop runs at least once"),
        })
    }
}
