//! Broker-fed worker pool: accumulation, flush, and dead-letter routing.

pub mod error;
pub mod pool;

pub use error::WorkerError;
pub use pool::WorkerPool;
