//! CRM repository trait: leads and the records workflow steps write.

use leadflow_types::crm::{AdvisorRouting, CommunicationLog, Notification, Task};
use leadflow_types::error::RepositoryError;
use leadflow_types::lead::{Lead, LeadQuery, LeadUpdate};
use uuid::Uuid;

/// Access to the CRM tables the engine reads and writes.
pub trait CrmRepository: Send + Sync {
    /// Get a lead by ID.
    fn get_lead(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Lead>, RepositoryError>> + Send;

    /// Get the leads with the given IDs. Unknown IDs are simply absent.
    fn get_leads(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<Vec<Lead>, RepositoryError>> + Send;

    /// Leads matching an audience query, in the store's natural order,
    /// capped at `query.limit`.
    fn find_leads(
        &self,
        query: &LeadQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Lead>, RepositoryError>> + Send;

    /// Apply a sparse patch to a lead.
    fn update_lead(
        &self,
        id: &Uuid,
        update: &LeadUpdate,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The routing-enabled advisor of `user_id` with the fewest assignments
    /// this week.
    fn least_loaded_advisor(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AdvisorRouting>, RepositoryError>> + Send;

    /// Count one more weekly assignment against an advisor.
    fn record_advisor_assignment(
        &self,
        advisor_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a task.
    fn create_task(
        &self,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a notification.
    fn create_notification(
        &self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append an entry to a lead's communication history.
    fn log_communication(
        &self,
        entry: &CommunicationLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
