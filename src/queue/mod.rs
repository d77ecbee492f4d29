//! Broker-backed queue: producer, consumer, and the facade trait joining them.

pub mod consumer;
pub mod error;
pub mod facade;
pub mod producer;

pub use consumer::{BrokerConsumer, ConsumerEvent};
pub use error::QueueError;
pub use facade::{BrokerQueue, ErrorSink, EventQueue};
pub use producer::Producer;
