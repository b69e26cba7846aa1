//! Enrollment lifecycle: create, advance one step, complete.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use leadflow_types::enrollment::{
    Enrollment, EnrollmentStatus, StepExecution, StepExecutionStatus, StepHistoryEntry,
};
use leadflow_types::error::RepositoryError;
use leadflow_types::lead::Lead;
use leadflow_types::workflow::WorkflowDefinition;
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::{EmailSender, SmsSender};
use crate::repository::crm::CrmRepository;
use crate::repository::enrollment::EnrollmentRepository;
use crate::workflow::step_runner::{StepContext, StepDirective, StepRunner};

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EnrollmentError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnrollmentError::Configuration(_))
    }
}

/// Result of an enrollment attempt.
#[derive(Debug, Clone)]
pub enum EnrollOutcome {
    Enrolled(Enrollment),
    /// Re-enrollment is disallowed and the lead already has an enrollment.
    AlreadyEnrolled,
}

/// What one `advance` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    /// Type of the step that ran, if any.
    pub step_type: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    /// The enrollment reached a normal end in this call.
    pub completed: bool,
    /// The enrollment left early in this call.
    pub exited: bool,
}

impl AdvanceReport {
    pub fn finished(&self) -> bool {
        self.completed || self.exited
    }
}

/// Creates enrollments and moves them through a workflow one step at a time.
pub struct EnrollmentManager<E, C, M, S> {
    enrollments: Arc<E>,
    steps: StepRunner<C, M, S>,
}

impl<E, C, M, S> EnrollmentManager<E, C, M, S>
where
    E: EnrollmentRepository,
    C: CrmRepository,
    M: EmailSender,
    S: SmsSender,
{
    pub fn new(enrollments: Arc<E>, steps: StepRunner<C, M, S>) -> Self {
        Self { enrollments, steps }
    }

    /// Create an active enrollment at the first actionable step.
    ///
    /// When the workflow disallows re-enrollment, any existing enrollment
    /// for the pair (active or finished) blocks the insert. The new row is
    /// claimed for one retry delay so a scheduler tick leaves it to the
    /// caller's first `advance`. If that never happens, the scheduler picks
    /// the enrollment up once the claim lapses.
    pub async fn enroll(
        &self,
        workflow: &WorkflowDefinition,
        lead_id: Uuid,
        user_id: Uuid,
        test_mode: bool,
    ) -> Result<EnrollOutcome, EnrollmentError> {
        let mut enrollment = Enrollment::new(workflow.id, lead_id, user_id, test_mode);
        enrollment.next_step_scheduled_at = Some(enrollment.enrolled_at + self.retry_delay());
        let allow_existing = workflow.enrollment_settings.re_enrollment_allowed;

        if self
            .enrollments
            .create_enrollment(&enrollment, allow_existing)
            .await?
        {
            tracing::debug!(
                workflow_id = %workflow.id,
                lead_id = %lead_id,
                enrollment_id = %enrollment.id,
                "lead enrolled"
            );
            Ok(EnrollOutcome::Enrolled(enrollment))
        } else {
            Ok(EnrollOutcome::AlreadyEnrolled)
        }
    }

    /// Execute the step under the cursor and persist the result.
    ///
    /// On success the step is appended to the history and the cursor moves
    /// per the step's directive. On a soft failure the cursor stays and the
    /// step is retried after the configured delay. Moving past the last
    /// actionable step completes the enrollment.
    pub async fn advance(
        &self,
        workflow: &WorkflowDefinition,
        enrollment: &mut Enrollment,
        lead: &Lead,
        now: DateTime<Utc>,
    ) -> Result<AdvanceReport, EnrollmentError> {
        if !enrollment.is_active() {
            return Ok(AdvanceReport::default());
        }

        let index = enrollment.current_step_index;
        let Some(step) = workflow.actionable_step(index) else {
            finish(enrollment, "completed", now);
            self.enrollments.update_enrollment(enrollment).await?;
            return Ok(AdvanceReport {
                success: true,
                completed: true,
                ..Default::default()
            });
        };

        let ctx = StepContext {
            user_id: enrollment.user_id,
            enrollment_id: enrollment.id,
            step_index: index,
            test_mode: enrollment.metadata.test_mode,
            now,
        };
        let step_type = step.step_type().to_string();
        let started_at = Utc::now();

        let outcome = match self.steps.run(&step.config, lead, &ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                self.record(
                    enrollment.id,
                    index,
                    &step_type,
                    step.config.to_value(),
                    started_at,
                    None,
                    Some(message.clone()),
                )
                .await?;
                return Err(EnrollmentError::Configuration(message));
            }
        };

        self.record(
            enrollment.id,
            index,
            &step_type,
            step.config.to_value(),
            started_at,
            outcome.success.then(|| outcome.result.clone()),
            outcome.error.clone(),
        )
        .await?;

        let mut report = AdvanceReport {
            step_type: Some(step_type.clone()),
            success: outcome.success,
            error: outcome.error.clone(),
            ..Default::default()
        };

        if !outcome.success {
            enrollment.next_step_scheduled_at = Some(now + self.retry_delay());
            self.enrollments.update_enrollment(enrollment).await?;
            return Ok(report);
        }

        enrollment.step_history.push(StepHistoryEntry {
            step_index: index,
            step_type,
            completed_at: now,
            result: outcome.result,
        });
        enrollment.next_step_scheduled_at = None;

        match outcome.directive {
            StepDirective::Advance => enrollment.current_step_index = index + 1,
            StepDirective::Schedule(at) => {
                enrollment.current_step_index = index + 1;
                enrollment.next_step_scheduled_at = Some(at);
            }
            StepDirective::JumpTo(target) => enrollment.current_step_index = target,
            StepDirective::Complete { exit_reason, exited } => {
                finish(enrollment, &exit_reason, now);
                report.completed = !exited;
                report.exited = exited;
            }
        }

        // A pending wait keeps the enrollment open even at the end of the
        // workflow; the scheduler completes it once the wait elapses.
        if enrollment.is_active()
            && enrollment.next_step_scheduled_at.is_none()
            && enrollment.current_step_index >= workflow.actionable_len()
        {
            finish(enrollment, "completed", now);
            report.completed = true;
        }

        self.enrollments.update_enrollment(enrollment).await?;
        Ok(report)
    }

    fn retry_delay(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.steps.config().retry_delay_minutes))
    }

    /// Close an enrollment whose workflow or lead disappeared.
    pub async fn abandon(
        &self,
        enrollment: &mut Enrollment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EnrollmentError> {
        finish(enrollment, reason, now);
        self.enrollments.update_enrollment(enrollment).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        enrollment_id: Uuid,
        step_index: usize,
        step_type: &str,
        step_config: serde_json::Value,
        started_at: DateTime<Utc>,
        result: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<(), RepositoryError> {
        let execution = StepExecution {
            id: Uuid::now_v7(),
            enrollment_id,
            step_index,
            step_type: step_type.to_string(),
            step_config,
            status: if error_message.is_none() {
                StepExecutionStatus::Completed
            } else {
                StepExecutionStatus::Failed
            },
            started_at,
            completed_at: Utc::now(),
            result,
            error_message,
        };
        self.enrollments.record_step_execution(&execution).await
    }
}

fn finish(enrollment: &mut Enrollment, reason: &str, now: DateTime<Utc>) {
    enrollment.status = EnrollmentStatus::Completed;
    enrollment.completed_at = Some(now);
    enrollment.exit_reason = Some(reason.to_string());
    enrollment.next_step_scheduled_at = None;
}
