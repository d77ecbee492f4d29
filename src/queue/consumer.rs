//! Broker poll loop: decode, hand off, commit (C3).

use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{ClientConfig, Message, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::event::EventBatch;
use crate::queue::error::QueueError;

pub struct BrokerConsumer {
    client: StreamConsumer,
    poll_timeout: Duration,
}

/// A transient or fatal condition surfaced off the main decode loop.
/// Transient variants are logged and the loop continues; `Fatal` ends it.
#[derive(Debug)]
pub enum ConsumerEvent {
    Transient(QueueError),
    Fatal(QueueError),
}

impl BrokerConsumer {
    pub fn new(config: &ConsumerConfig) -> Result<Self, QueueError> {
        let client: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| QueueError::ClientConfig(e.to_string()))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        client
            .subscribe(&topics)
            .map_err(|e| QueueError::ClientConfig(e.to_string()))?;

        info!(topics = ?config.topics, group = %config.consumer_group, "subscribed to broker topics");

        Ok(Self {
            client,
            poll_timeout: config.poll_fetches_timeout,
        })
    }

    /// Long-running poll/decode/commit loop. Terminates on `cancel`, or when
    /// the broker client reports itself closed (emitted on `errors` first).
    ///
    /// Offsets are committed only after the corresponding batch has been
    /// handed off on `out` — never before — so a crash between send and
    /// commit replays the record rather than losing it.
    pub async fn consume(
        &self,
        out: mpsc::Sender<EventBatch>,
        errors: mpsc::Sender<ConsumerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                debug!("consumer loop cancelled");
                return;
            }

            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("consumer loop cancelled mid-poll");
                    return;
                }
                result = tokio::time::timeout(self.poll_timeout, self.client.recv()) => result,
            };

            let message = match message {
                Err(_elapsed) => continue,
                Ok(Err(err)) if is_client_closed(&err) => {
                    let _ = errors
                        .send(ConsumerEvent::Fatal(QueueError::ClientClosed))
                        .await;
                    return;
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "transient consumer error");
                    let _ = errors.send(ConsumerEvent::Transient(err.into())).await;
                    continue;
                }
                Ok(Ok(message)) => message,
            };

            let payload = message.payload().unwrap_or_default();
            let batch: EventBatch = match serde_json::from_slice(payload) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(
                        error = %err,
                        partition = message.partition(),
                        offset = message.offset(),
                        "poison record, committing past it"
                    );
                    self.commit(&message);
                    continue;
                }
            };

            if out.send(batch).await.is_err() {
                debug!("inbound channel closed, stopping consumer");
                return;
            }
            self.commit(&message);
        }
    }

    fn commit(&self, message: &rdkafka::message::BorrowedMessage<'_>) {
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(
            message.topic(),
            message.partition(),
            rdkafka::Offset::Offset(message.offset() + 1),
        );
        if let Err(err) = self.client.commit(&tpl, CommitMode::Async) {
            error!(error = %err, "failed to commit offset");
        }
    }
}

/// `rdkafka` surfaces a dead client as a consumption error whose message
/// names the condition explicitly; there is no dedicated error variant.
fn is_client_closed(err: &KafkaError) -> bool {
    err.to_string().to_ascii_lowercase().contains("handle is destroyed")
}
