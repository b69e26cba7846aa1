//! Enrollment and step execution repository trait.

use chrono::{DateTime, Utc};
use leadflow_types::enrollment::{Enrollment, StepExecution};
use leadflow_types::error::RepositoryError;
use uuid::Uuid;

/// Storage for enrollments and their step execution audit trail.
pub trait EnrollmentRepository: Send + Sync {
    /// Insert a new enrollment.
    ///
    /// When `allow_existing` is false the insert only happens if no
    /// enrollment exists for the same (workflow, lead) pair; the check and
    /// the insert are a single atomic operation. Returns whether the row was
    /// inserted.
    fn create_enrollment(
        &self,
        enrollment: &Enrollment,
        allow_existing: bool,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Get an enrollment by ID.
    fn get_enrollment(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Enrollment>, RepositoryError>> + Send;

    /// Persist cursor, status, history and schedule changes.
    fn update_enrollment(
        &self,
        enrollment: &Enrollment,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Enrollments of a workflow, most recent first.
    fn list_enrollments(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Enrollment>, RepositoryError>> + Send;

    /// Active enrollments whose next step is due at `now` (unscheduled or
    /// scheduled in the past), oldest schedule first.
    fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Enrollment>, RepositoryError>> + Send;

    /// Append an immutable step execution record.
    fn record_step_execution(
        &self,
        execution: &StepExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Step executions of an enrollment, in execution order.
    fn list_step_executions(
        &self,
        enrollment_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepExecution>, RepositoryError>> + Send;
}
