//! Observability setup for Leadflow: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
