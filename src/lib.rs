//! Event ingestion pipeline: HTTP NDJSON intake, broker-buffered worker
//! pool, columnar store writer.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod logging;
pub mod queue;
pub mod service;
pub mod store;
pub mod waiter;
pub mod worker;

pub use config::Config;
pub use error::{AppError, Result};
pub use event::{Event, EventBatch, FailurePayload};

/// Library version, exposed for diagnostics and the readiness surface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
