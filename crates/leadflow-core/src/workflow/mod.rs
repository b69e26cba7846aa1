//! Workflow execution engine.
//!
//! - [`step_runner`]: executes a single typed step for one lead
//! - [`enrollment`]: creates enrollments and advances them step by step
//! - [`runner`]: one execute-workflow invocation over a set of leads
//! - [`scheduler`]: resumes enrollments whose next step is due

pub mod condition;
pub mod enrollment;
pub mod runner;
pub mod scheduler;
pub mod step_runner;
