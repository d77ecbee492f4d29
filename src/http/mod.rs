//! HTTP surface: readiness probe, event intake, error envelope (C8).

pub mod handlers;
pub mod ip;
pub mod router;

pub use router::{build_router, AppState};
