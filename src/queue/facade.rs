//! Uniform publish/consume interface over the broker pair (C4).
//!
//! Isolates the worker pool from broker identity: production code talks to
//! `BrokerQueue`, tests can substitute a channel-backed fake.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::{EventBatch, FailurePayload};
use crate::queue::consumer::{BrokerConsumer, ConsumerEvent};
use crate::queue::error::QueueError;
use crate::queue::producer::Producer;

#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn publish(&self, cancel: &CancellationToken, batch: &EventBatch) -> Result<(), QueueError>;

    async fn consume(
        &self,
        out: mpsc::Sender<EventBatch>,
        errors: mpsc::Sender<ConsumerEvent>,
        cancel: CancellationToken,
    );
}

/// The dead-letter side of the pipeline: wherever a `FailurePayload` goes
/// when normal persistence fails. Symmetric to `EventQueue::publish` but
/// over a distinct payload type and topic, so a production `Producer`
/// pointed at `error_topic` implements it directly.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn publish_failure(
        &self,
        cancel: &CancellationToken,
        failure: &FailurePayload,
    ) -> Result<(), QueueError>;
}

#[async_trait]
impl ErrorSink for Producer {
    async fn publish_failure(
        &self,
        cancel: &CancellationToken,
        failure: &FailurePayload,
    ) -> Result<(), QueueError> {
        self.publish(cancel, &failure.payload.id, failure).await
    }
}

pub struct BrokerQueue {
    producer: Producer,
    consumer: BrokerConsumer,
}

impl BrokerQueue {
    pub fn new(producer: Producer, consumer: BrokerConsumer) -> Self {
        Self { producer, consumer }
    }
}

#[async_trait]
impl EventQueue for BrokerQueue {
    async fn publish(&self, cancel: &CancellationToken, batch: &EventBatch) -> Result<(), QueueError> {
        self.producer.publish(cancel, &batch.id, batch).await
    }

    async fn consume(
        &self,
        out: mpsc::Sender<EventBatch>,
        errors: mpsc::Sender<ConsumerEvent>,
        cancel: CancellationToken,
    ) {
        self.consumer.consume(out, errors, cancel).await
    }
}
