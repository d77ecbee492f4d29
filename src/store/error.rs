//! Error kinds for the columnar store client (C6).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to store: {0}")]
    Connection(String),

    #[error("migration failed: {0}")]
    Migration(#[source] clickhouse::error::Error),

    #[error("insert failed: {0}")]
    Insert(#[source] clickhouse::error::Error),
}
