//! Workflow definition repository trait.

use chrono::{DateTime, Utc};
use leadflow_types::error::RepositoryError;
use leadflow_types::workflow::{StatsDelta, WorkflowDefinition};
use uuid::Uuid;

/// Storage for workflow definitions and their execution statistics.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List definitions, optionally restricted to one owner, ordered by name.
    fn list_definitions(
        &self,
        user_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Fold a run's counters into the workflow's `execution_stats`.
    ///
    /// Implementations apply the delta atomically (no read-modify-write in
    /// the caller), so concurrent runs of the same workflow do not lose
    /// updates.
    fn record_execution(
        &self,
        workflow_id: &Uuid,
        delta: &StatsDelta,
        executed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
