//! Workflow engine logic and repository trait definitions for Leadflow.
//!
//! This crate defines the "ports" (repository and delivery traits) that the
//! infrastructure layer implements, plus the engine itself: personalization,
//! step execution, enrollment management, the workflow runner and the
//! due-enrollment scheduler. It depends only on `leadflow-types` -- never on
//! `leadflow-infra` or any database/IO crate.

pub mod delivery;
pub mod personalize;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
