//! Scheduler: resumes due enrollments one step at a time.
//!
//! Each `tick` picks up active enrollments whose next step is due, advances
//! them through the enrollment manager and folds completions into each
//! workflow's statistics. The API crate drives `tick` from a background
//! interval, the CLI and an HTTP endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use leadflow_types::enrollment::Enrollment;
use leadflow_types::execution::TickSummary;
use leadflow_types::workflow::{StatsDelta, WorkflowDefinition};
use uuid::Uuid;

use crate::delivery::{EmailSender, SmsSender};
use crate::repository::crm::CrmRepository;
use crate::repository::enrollment::EnrollmentRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::workflow::enrollment::{EnrollmentError, EnrollmentManager};
use crate::workflow::runner::RunnerError;

pub struct Scheduler<W, E, C, M, S> {
    workflows: Arc<W>,
    enrollments: Arc<E>,
    crm: Arc<C>,
    manager: Arc<EnrollmentManager<E, C, M, S>>,
    batch_size: u32,
}

impl<W, E, C, M, S> Scheduler<W, E, C, M, S>
where
    W: WorkflowRepository,
    E: EnrollmentRepository,
    C: CrmRepository,
    M: EmailSender,
    S: SmsSender,
{
    pub fn new(
        workflows: Arc<W>,
        enrollments: Arc<E>,
        crm: Arc<C>,
        manager: Arc<EnrollmentManager<E, C, M, S>>,
        batch_size: u32,
    ) -> Self {
        Self {
            workflows,
            enrollments,
            crm,
            manager,
            batch_size,
        }
    }

    /// Advance every enrollment due at `now`, up to the batch size.
    ///
    /// Enrollments whose workflow or lead no longer exists are closed with
    /// `workflow_not_found` / `lead_not_found`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, RunnerError> {
        let due = self.enrollments.list_due(now, self.batch_size).await?;
        let mut summary = TickSummary::default();
        let mut workflows: HashMap<Uuid, Option<WorkflowDefinition>> = HashMap::new();
        let mut deltas: HashMap<Uuid, StatsDelta> = HashMap::new();

        for mut enrollment in due {
            summary.processed += 1;

            if !workflows.contains_key(&enrollment.workflow_id) {
                let def = self.workflows.get_definition(&enrollment.workflow_id).await?;
                workflows.insert(enrollment.workflow_id, def);
            }
            let workflow = workflows.get(&enrollment.workflow_id).and_then(Option::as_ref);

            let result = match workflow {
                Some(workflow) => {
                    self.step(workflow, &mut enrollment, now, &mut summary, &mut deltas)
                        .await
                }
                None => self
                    .manager
                    .abandon(&mut enrollment, "workflow_not_found", now)
                    .await
                    .map(|()| summary.completed += 1),
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    self.flush(&deltas, now).await;
                    return Err(RunnerError::Configuration(e.to_string()));
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        enrollment_id = %enrollment.id,
                        error = %e,
                        "failed to advance enrollment"
                    );
                }
            }
        }

        self.flush(&deltas, now).await;
        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                advanced = summary.advanced,
                completed = summary.completed,
                failed = summary.failed,
                "scheduler tick finished"
            );
        }
        Ok(summary)
    }

    async fn step(
        &self,
        workflow: &WorkflowDefinition,
        enrollment: &mut Enrollment,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
        deltas: &mut HashMap<Uuid, StatsDelta>,
    ) -> Result<(), EnrollmentError> {
        let Some(lead) = self.crm.get_lead(&enrollment.lead_id).await? else {
            self.manager.abandon(enrollment, "lead_not_found", now).await?;
            summary.completed += 1;
            deltas.entry(workflow.id).or_default().exited += 1;
            return Ok(());
        };

        let report = self.manager.advance(workflow, enrollment, &lead, now).await?;
        if report.success {
            summary.advanced += 1;
        } else {
            summary.failed += 1;
        }
        if report.finished() {
            summary.completed += 1;
            let delta = deltas.entry(workflow.id).or_default();
            if report.exited {
                delta.exited += 1;
            } else {
                delta.completed += 1;
            }
        }
        Ok(())
    }

    async fn flush(&self, deltas: &HashMap<Uuid, StatsDelta>, now: DateTime<Utc>) {
        for (workflow_id, delta) in deltas {
            if delta.is_empty() {
                continue;
            }
            if let Err(e) = self.workflows.record_execution(workflow_id, delta, now).await {
                tracing::warn!(workflow_id = %workflow_id, error = %e, "failed to record stats");
            }
        }
    }
}
