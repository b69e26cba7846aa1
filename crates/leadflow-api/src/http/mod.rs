//! HTTP layer for Leadflow.
//!
//! Axum router exposing the execute-workflow endpoint, a manual scheduler
//! tick and read-only enrollment inspection.

pub mod error;
pub mod handlers;
pub mod router;
