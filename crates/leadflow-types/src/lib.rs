//! Shared domain types for Leadflow.
//!
//! This crate contains the domain types used across the workflow engine:
//! Lead, WorkflowDefinition (with typed step configurations), Enrollment,
//! StepExecution, the execute-workflow request/response shapes, CRM side-effect
//! records, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod crm;
pub mod enrollment;
pub mod error;
pub mod execution;
pub mod lead;
pub mod workflow;
