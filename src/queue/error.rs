//! Error kinds for the producer/consumer pair (C2/C3).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("publish cancelled")]
    Cancelled,

    #[error("publish failed after {attempts} attempt(s): {source}")]
    PublishFailed {
        attempts: u32,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("broker client closed")]
    ClientClosed,

    #[error("broker error: {0}")]
    Broker(#[from] rdkafka::error::KafkaError),

    #[error("failed to build client: {0}")]
    ClientConfig(String),
}
