//! Columnar store client: connection, migration, and row mapping.

pub mod client;
pub mod error;
pub mod row;

pub use client::{Store, StoreWriter};
pub use error::StoreError;
pub use row::EventRow;
