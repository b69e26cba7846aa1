//! Workflow runner: one execute-workflow invocation.
//!
//! Resolves the lead set, enrolls each lead and executes its first step,
//! then folds the run's counters into the workflow's statistics. Leads are
//! processed sequentially; a failure for one lead is recorded in the result
//! and never aborts the batch. Only fatal configuration errors do.

use std::sync::Arc;

use chrono::Utc;
use leadflow_types::config::EngineConfig;
use leadflow_types::error::RepositoryError;
use leadflow_types::execution::{ExecutionRequest, ExecutionResult, LeadOutcome};
use leadflow_types::lead::{Lead, LeadQuery};
use leadflow_types::workflow::{StatsDelta, WorkflowDefinition};
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::{EmailSender, SmsSender};
use crate::repository::crm::CrmRepository;
use crate::repository::enrollment::EnrollmentRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::workflow::enrollment::{EnrollOutcome, EnrollmentError, EnrollmentManager};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A lead resolved for this run, or an explicit ID that matched nothing.
enum Candidate {
    Found(Lead),
    Missing(Uuid),
}

pub struct WorkflowRunner<W, E, C, M, S> {
    workflows: Arc<W>,
    crm: Arc<C>,
    manager: Arc<EnrollmentManager<E, C, M, S>>,
    config: EngineConfig,
}

impl<W, E, C, M, S> WorkflowRunner<W, E, C, M, S>
where
    W: WorkflowRepository,
    E: EnrollmentRepository,
    C: CrmRepository,
    M: EmailSender,
    S: SmsSender,
{
    pub fn new(
        workflows: Arc<W>,
        crm: Arc<C>,
        manager: Arc<EnrollmentManager<E, C, M, S>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            workflows,
            crm,
            manager,
            config,
        }
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RunnerError> {
        let workflow = self
            .workflows
            .get_definition(&request.workflow_id)
            .await?
            .ok_or(RunnerError::WorkflowNotFound(request.workflow_id))?;

        let candidates = self.resolve_leads(&workflow, request).await?;
        tracing::info!(
            workflow_id = %workflow.id,
            leads = candidates.len(),
            test_mode = request.test_mode,
            "executing workflow"
        );

        let mut result = ExecutionResult {
            total: candidates.len() as u64,
            ..Default::default()
        };
        let mut delta = StatsDelta::default();

        for candidate in candidates {
            let lead = match candidate {
                Candidate::Found(lead) => lead,
                Candidate::Missing(lead_id) => {
                    result.record(LeadOutcome::failed(lead_id, "lead not found"));
                    continue;
                }
            };

            match self.process_lead(&workflow, &lead, request, &mut delta).await {
                Ok(outcome) => result.record(outcome),
                Err(e) if e.is_fatal() => {
                    self.flush_stats(&workflow.id, &delta).await;
                    return Err(RunnerError::Configuration(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        lead_id = %lead.id,
                        error = %e,
                        "failed to process lead"
                    );
                    result.record(LeadOutcome::failed(lead.id, e.to_string()));
                }
            }
        }

        self.workflows
            .record_execution(&workflow.id, &delta, Utc::now())
            .await?;

        tracing::info!(
            workflow_id = %workflow.id,
            total = result.total,
            enrolled = result.enrolled,
            skipped = result.skipped,
            failed = result.failed,
            "workflow execution finished"
        );
        Ok(result)
    }

    /// Explicit IDs take precedence, in request order; otherwise the
    /// audience filter selects the owner's leads. Both are capped.
    async fn resolve_leads(
        &self,
        workflow: &WorkflowDefinition,
        request: &ExecutionRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        let cap = self.config.max_leads_per_run as usize;

        if let Some(ids) = &request.lead_ids {
            let ids: Vec<Uuid> = ids.iter().copied().take(cap).collect();
            let mut found = self.crm.get_leads(&ids).await?;
            return Ok(ids
                .into_iter()
                .map(|id| match found.iter().position(|l| l.id == id) {
                    Some(i) => Candidate::Found(found.swap_remove(i)),
                    None => Candidate::Missing(id),
                })
                .collect());
        }

        let filter = &workflow.enrollment_settings.audience_filter;
        let query = LeadQuery {
            user_id: request.user_id,
            statuses: filter.statuses.clone(),
            sources: filter.sources.clone(),
            tags: filter.tags.clone(),
            limit: self.config.max_leads_per_run,
        };
        let leads = self.crm.find_leads(&query).await?;
        Ok(leads.into_iter().take(cap).map(Candidate::Found).collect())
    }

    async fn process_lead(
        &self,
        workflow: &WorkflowDefinition,
        lead: &Lead,
        request: &ExecutionRequest,
        delta: &mut StatsDelta,
    ) -> Result<LeadOutcome, EnrollmentError> {
        let mut enrollment = match self
            .manager
            .enroll(workflow, lead.id, request.user_id, request.test_mode)
            .await?
        {
            EnrollOutcome::Enrolled(enrollment) => enrollment,
            EnrollOutcome::AlreadyEnrolled => {
                return Ok(LeadOutcome::skipped(lead.id, "already enrolled"));
            }
        };
        delta.enrolled += 1;

        let report = self
            .manager
            .advance(workflow, &mut enrollment, lead, Utc::now())
            .await?;
        if report.completed {
            delta.completed += 1;
        }
        if report.exited {
            delta.exited += 1;
        }

        let mut outcome = LeadOutcome::enrolled(lead.id, enrollment.id);
        outcome.error = report.error;
        Ok(outcome)
    }

    /// Best-effort stats write before an aborted run returns its error.
    async fn flush_stats(&self, workflow_id: &Uuid, delta: &StatsDelta) {
        if delta.is_empty() {
            return;
        }
        if let Err(e) = self
            .workflows
            .record_execution(workflow_id, delta, Utc::now())
            .await
        {
            tracing::warn!(workflow_id = %workflow_id, error = %e, "failed to record stats");
        }
    }
}
