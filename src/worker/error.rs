//! Error kinds surfaced by the worker pool (C5).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("store write failed: {0}")]
    Write(#[from] crate::store::StoreError),

    #[error("publish failed: {0}")]
    Publish(#[from] crate::queue::QueueError),
}
