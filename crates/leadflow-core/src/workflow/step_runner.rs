//! Step execution.
//!
//! [`StepRunner::run`] dispatches a typed [`StepConfig`] to its executor with
//! a single exhaustive match. Executors perform the step's side effect (or
//! only describe it in test mode) and report back a [`StepOutcome`] whose
//! [`StepDirective`] tells the enrollment manager how to move the cursor.
//!
//! Errors never leak past `run` except [`StepError::Configuration`], which
//! aborts the whole invocation. Everything else becomes a failed outcome.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use leadflow_types::config::EngineConfig;
use leadflow_types::crm::{Channel, CommunicationLog, Notification, Task, TaskStatus};
use leadflow_types::error::{DeliveryError, RepositoryError};
use leadflow_types::lead::{Lead, LeadUpdate};
use leadflow_types::workflow::{
    AdvisorSelection, AssignAdvisorStep, AssigneeTarget, BranchAction, ConditionStep,
    CreateTaskStep, EmailStep, EndWorkflowStep, NotificationStep, RecipientTarget, SmsStep,
    StepConfig, TagsAction, UpdateLeadStep, WaitStep,
};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::{EmailMessage, EmailSender, SmsMessage, SmsSender};
use crate::personalize::personalize;
use crate::repository::crm::CrmRepository;
use crate::workflow::condition;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Per-step execution context.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// User the run acts on behalf of (workflow owner).
    pub user_id: Uuid,
    pub enrollment_id: Uuid,
    /// Actionable step index being executed.
    pub step_index: usize,
    pub test_mode: bool,
    pub now: DateTime<Utc>,
}

/// What the enrollment should do after a successful step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDirective {
    /// Move to the next actionable step.
    Advance,
    /// Move to the next actionable step, but not before the given instant.
    Schedule(DateTime<Utc>),
    /// Continue at the given actionable step index.
    JumpTo(usize),
    /// Leave the workflow. `exited` marks an early exit rather than a
    /// normal completion.
    Complete { exit_reason: String, exited: bool },
}

/// Result of executing one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
    pub directive: StepDirective,
}

impl StepOutcome {
    pub fn completed(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
            directive: StepDirective::Advance,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(error.into()),
            directive: StepDirective::Advance,
        }
    }

    pub fn then(mut self, directive: StepDirective) -> Self {
        self.directive = directive;
        self
    }
}

/// Errors raised inside an executor.
#[derive(Debug, Error)]
pub enum StepError {
    /// A capability is missing its configuration. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("delivery failed: {0}")]
    Delivery(DeliveryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The lead or environment does not allow the step (no phone, no advisor, ...).
    #[error("{0}")]
    Precondition(String),
}

impl StepError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Configuration(_))
    }
}

impl From<DeliveryError> for StepError {
    fn from(err: DeliveryError) -> Self {
        if err.is_fatal() {
            StepError::Configuration(err.to_string())
        } else {
            StepError::Delivery(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes workflow steps against the CRM and delivery capabilities.
pub struct StepRunner<C, M, S> {
    crm: Arc<C>,
    email: Arc<M>,
    sms: Arc<S>,
    config: EngineConfig,
}

impl<C, M, S> StepRunner<C, M, S>
where
    C: CrmRepository,
    M: EmailSender,
    S: SmsSender,
{
    pub fn new(crm: Arc<C>, email: Arc<M>, sms: Arc<S>, config: EngineConfig) -> Self {
        Self {
            crm,
            email,
            sms,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one step for one lead.
    ///
    /// Returns `Err` only for fatal configuration errors. In test mode no
    /// provider is called and no CRM record is written; successful results
    /// carry `test_mode: true`.
    pub async fn run(
        &self,
        step: &StepConfig,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        tracing::debug!(
            enrollment_id = %ctx.enrollment_id,
            lead_id = %lead.id,
            step_index = ctx.step_index,
            step_type = step.step_type(),
            test_mode = ctx.test_mode,
            "executing step"
        );

        match self.execute(step, lead, ctx).await {
            Ok(mut outcome) => {
                if ctx.test_mode {
                    if let Value::Object(map) = &mut outcome.result {
                        map.insert("test_mode".to_string(), Value::Bool(true));
                    }
                }
                Ok(outcome)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(
                    enrollment_id = %ctx.enrollment_id,
                    lead_id = %lead.id,
                    step_type = step.step_type(),
                    error = %e,
                    "step failed"
                );
                Ok(StepOutcome::failed(e.to_string()))
            }
        }
    }

    async fn execute(
        &self,
        step: &StepConfig,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        match step {
            StepConfig::Trigger(_) => Ok(StepOutcome::completed(json!({
                "skipped": true,
                "reason": "trigger steps are not executed",
            }))),
            StepConfig::Email(config) => self.send_email(config, lead, ctx).await,
            StepConfig::Sms(config) => self.send_sms(config, lead, ctx).await,
            StepConfig::Wait(config) => wait(config, ctx),
            StepConfig::Condition(config) => Ok(branch(config, lead)),
            StepConfig::UpdateLead(config) => self.update_lead(config, lead, ctx).await,
            StepConfig::CreateTask(config) => self.create_task(config, lead, ctx).await,
            StepConfig::AssignAdvisor(config) => self.assign_advisor(config, lead, ctx).await,
            StepConfig::InternalNotification(config) => self.notify(config, lead, ctx).await,
            StepConfig::EndWorkflow(config) => Ok(end_workflow(config)),
            StepConfig::Unsupported { step_type, .. } => Ok(StepOutcome::completed(json!({
                "skipped": true,
                "reason": "unknown step type",
                "step_type": step_type,
            }))),
        }
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    async fn send_email(
        &self,
        config: &EmailStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let to = lead
            .contact_email()
            .ok_or_else(|| StepError::Precondition("lead has no email address".to_string()))?;
        let subject = personalize(&config.subject, lead);
        let content = personalize(&config.content, lead);

        if ctx.test_mode {
            return Ok(StepOutcome::completed(json!({
                "to": to,
                "subject": subject,
                "content": content,
            })));
        }

        let message = EmailMessage {
            from_name: config
                .from_name
                .clone()
                .unwrap_or_else(|| self.config.default_from_name.clone()),
            from_email: config
                .from_email
                .clone()
                .unwrap_or_else(|| self.config.default_from_email.clone()),
            to: to.to_string(),
            subject: subject.clone(),
            html: content.clone(),
            reply_to: config.reply_to.clone(),
        };
        let receipt = self.email.send(&message).await?;

        self.log_communication(CommunicationLog::outbound(
            lead.id,
            ctx.user_id,
            Channel::Email,
            Some(subject.clone()),
            content,
            receipt.provider_message_id.clone(),
        ))
        .await;

        Ok(StepOutcome::completed(json!({
            "sent": true,
            "to": to,
            "subject": subject,
            "message_id": receipt.provider_message_id,
        })))
    }

    async fn send_sms(
        &self,
        config: &SmsStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let to = lead
            .contact_phone()
            .ok_or_else(|| StepError::Precondition("lead has no phone number".to_string()))?;

        let mut body = personalize(&config.content, lead);
        if config.include_opt_out {
            let footer = config
                .opt_out_text
                .as_deref()
                .unwrap_or(&self.config.sms_opt_out_text);
            body.push_str("\n\n");
            body.push_str(footer);
        }

        if ctx.test_mode {
            return Ok(StepOutcome::completed(json!({ "to": to, "content": body })));
        }

        let message = SmsMessage {
            to: to.to_string(),
            body: body.clone(),
        };
        let receipt = self.sms.send(&message).await?;

        self.log_communication(CommunicationLog::outbound(
            lead.id,
            ctx.user_id,
            Channel::Sms,
            None,
            body,
            receipt.provider_message_id.clone(),
        ))
        .await;

        Ok(StepOutcome::completed(json!({
            "sent": true,
            "to": to,
            "message_id": receipt.provider_message_id,
        })))
    }

    /// The message already went out, so a failed log write only warns.
    async fn log_communication(&self, entry: CommunicationLog) {
        if let Err(e) = self.crm.log_communication(&entry).await {
            tracing::warn!(
                lead_id = %entry.lead_id,
                channel = %entry.channel,
                error = %e,
                "failed to log communication"
            );
        }
    }

    // -----------------------------------------------------------------------
    // CRM mutations
    // -----------------------------------------------------------------------

    async fn update_lead(
        &self,
        config: &UpdateLeadStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let patch = match config {
            UpdateLeadStep::Status { status } => LeadUpdate {
                status: Some(status.clone()),
                ..Default::default()
            },
            UpdateLeadStep::Tags { tags, tags_action } => LeadUpdate {
                tags: Some(merge_tags(&lead.tags, &tags.0, *tags_action)),
                ..Default::default()
            },
            UpdateLeadStep::Score { score_change } => LeadUpdate {
                lead_score: Some(lead.lead_score.saturating_add(*score_change)),
                ..Default::default()
            },
            UpdateLeadStep::Priority { priority } => LeadUpdate {
                priority: Some(priority.clone()),
                ..Default::default()
            },
            UpdateLeadStep::ProgramInterest { program_interest } => LeadUpdate {
                program_interest: Some(program_interest.clone()),
                ..Default::default()
            },
        };

        if !ctx.test_mode {
            self.crm.update_lead(&lead.id, &patch).await?;
        }

        Ok(StepOutcome::completed(json!({
            "updated": !ctx.test_mode,
            "updates": patch,
        })))
    }

    async fn create_task(
        &self,
        config: &CreateTaskStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let assigned_to = match config.assign_to {
            AssigneeTarget::LeadAdvisor => lead.assigned_to.unwrap_or(ctx.user_id),
            AssigneeTarget::Specific => config.assignee_id.unwrap_or(ctx.user_id),
            AssigneeTarget::CurrentUser => ctx.user_id,
        };
        let due_date = TimeDelta::try_days(config.due_in_days)
            .filter(|due_in| *due_in >= TimeDelta::zero())
            .and_then(|due_in| ctx.now.checked_add_signed(due_in))
            .ok_or_else(|| {
                StepError::Precondition(format!("dueInDays out of range: {}", config.due_in_days))
            })?;

        let task = Task {
            id: Uuid::now_v7(),
            user_id: ctx.user_id,
            lead_id: lead.id,
            title: personalize(&config.title, lead),
            description: config.description.as_deref().map(|d| personalize(d, lead)),
            due_date,
            priority: config.priority.clone(),
            status: TaskStatus::Pending,
            assigned_to,
            created_at: ctx.now,
        };

        if ctx.test_mode {
            return Ok(StepOutcome::completed(json!({ "task": task })));
        }

        self.crm.create_task(&task).await?;
        Ok(StepOutcome::completed(json!({
            "task_id": task.id,
            "assigned_to": task.assigned_to,
            "due_date": task.due_date,
        })))
    }

    async fn assign_advisor(
        &self,
        config: &AssignAdvisorStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let advisor_id = match config.assignment_type {
            AdvisorSelection::Specific => config.advisor_id,
            AdvisorSelection::LoadBalance => self
                .crm
                .least_loaded_advisor(&ctx.user_id)
                .await?
                .map(|routing| routing.advisor_id),
        };
        let advisor_id = advisor_id
            .ok_or_else(|| StepError::Precondition("no eligible advisor available".to_string()))?;

        if ctx.test_mode {
            return Ok(StepOutcome::completed(json!({
                "advisor_id": advisor_id,
                "notify_advisor": config.notify_advisor,
            })));
        }

        let patch = LeadUpdate {
            assigned_to: Some(advisor_id),
            ..Default::default()
        };
        self.crm.update_lead(&lead.id, &patch).await?;
        self.crm.record_advisor_assignment(&advisor_id).await?;

        if config.notify_advisor {
            let name = match lead.full_name() {
                name if name.is_empty() => "A new lead".to_string(),
                name => name,
            };
            let notification = Notification::new(
                advisor_id,
                "New lead assigned".to_string(),
                format!("{name} has been assigned to you."),
                "lead_assignment",
                Some(lead.id),
            );
            self.crm.create_notification(&notification).await?;
        }

        Ok(StepOutcome::completed(json!({
            "advisor_id": advisor_id,
            "notified": config.notify_advisor,
        })))
    }

    async fn notify(
        &self,
        config: &NotificationStep,
        lead: &Lead,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        let recipients: Vec<Uuid> = match config.recipients {
            RecipientTarget::LeadAdvisor => {
                let advisor = lead.assigned_to.ok_or_else(|| {
                    StepError::Precondition("lead has no assigned advisor".to_string())
                })?;
                vec![advisor]
            }
            RecipientTarget::Specific => config.recipient_ids.0.clone(),
        };
        let title = personalize(
            config.title.as_deref().unwrap_or("Workflow notification"),
            lead,
        );
        let message = personalize(&config.message, lead);

        if ctx.test_mode {
            return Ok(StepOutcome::completed(json!({
                "recipients": recipients,
                "title": title,
                "message": message,
            })));
        }

        for recipient in &recipients {
            let notification = Notification::new(
                *recipient,
                title.clone(),
                message.clone(),
                "workflow",
                Some(lead.id),
            );
            self.crm.create_notification(&notification).await?;
        }

        Ok(StepOutcome::completed(json!({ "notified": recipients.len() })))
    }
}

// ---------------------------------------------------------------------------
// Pure executors
// ---------------------------------------------------------------------------

fn wait(config: &WaitStep, ctx: &StepContext) -> Result<StepOutcome, StepError> {
    let resume_at = config.wait_time.resume_at(ctx.now).ok_or_else(|| {
        StepError::Precondition(format!(
            "waitTime out of range: {} {:?}",
            config.wait_time.value, config.wait_time.unit
        ))
    })?;
    Ok(StepOutcome::completed(json!({
        "wait_time": config.wait_time,
        "scheduled_for": resume_at,
    }))
    .then(StepDirective::Schedule(resume_at)))
}

fn branch(config: &ConditionStep, lead: &Lead) -> StepOutcome {
    let matched = condition::evaluate(config, lead);
    let directive = if matched {
        StepDirective::Advance
    } else {
        match config.if_false {
            BranchAction::Continue => StepDirective::Advance,
            BranchAction::End => StepDirective::Complete {
                exit_reason: "condition_not_met".to_string(),
                exited: true,
            },
            BranchAction::JumpTo(index) => StepDirective::JumpTo(index),
        }
    };
    StepOutcome::completed(json!({
        "condition_met": matched,
        "field": config.field,
        "operator": config.operator,
        "value": config.value,
    }))
    .then(directive)
}

fn end_workflow(config: &EndWorkflowStep) -> StepOutcome {
    let exit_reason = config
        .exit_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("completed")
        .to_string();
    StepOutcome::completed(json!({ "ended": true, "exit_reason": exit_reason })).then(
        StepDirective::Complete {
            exit_reason,
            exited: false,
        },
    )
}

/// Combine a lead's tags with a step's tags.
///
/// `Add` keeps the current order and appends unseen tags; `Remove` drops the
/// given tags; `Replace` takes the given tags. The result never contains
/// duplicates.
pub fn merge_tags(current: &[String], incoming: &[String], action: TagsAction) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut push = |tag: &String| {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    };
    match action {
        TagsAction::Add => current.iter().chain(incoming).for_each(&mut push),
        TagsAction::Remove => current
            .iter()
            .filter(|t| !incoming.contains(t))
            .for_each(&mut push),
        TagsAction::Replace => incoming.iter().for_each(&mut push),
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmail, FakeSms, MemoryCrm, SenderMode, sample_lead};
    use leadflow_types::workflow::{TagList, WaitDuration, WaitUnit};

    struct Fixture {
        crm: Arc<MemoryCrm>,
        email: Arc<FakeEmail>,
        sms: Arc<FakeSms>,
        runner: StepRunner<MemoryCrm, FakeEmail, FakeSms>,
        lead: Lead,
    }

    fn fixture_with(mode: SenderMode) -> Fixture {
        let lead = sample_lead(Uuid::now_v7());
        let crm = Arc::new(MemoryCrm::with_leads(vec![lead.clone()]));
        let email = Arc::new(FakeEmail::with_mode(mode));
        let sms = Arc::new(FakeSms::with_mode(mode));
        let runner = StepRunner::new(
            crm.clone(),
            email.clone(),
            sms.clone(),
            EngineConfig::default(),
        );
        Fixture {
            crm,
            email,
            sms,
            runner,
            lead,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SenderMode::Accept)
    }

    fn ctx(lead: &Lead, test_mode: bool) -> StepContext {
        StepContext {
            user_id: lead.user_id,
            enrollment_id: Uuid::now_v7(),
            step_index: 0,
            test_mode,
            now: Utc::now(),
        }
    }

    fn email_step() -> StepConfig {
        StepConfig::parse(
            "email",
            json!({ "subject": "Hi {{firstName}}", "content": "About {{programName}}" }),
        )
        .unwrap()
    }

    fn tags_step(tags: &str, action: TagsAction) -> StepConfig {
        StepConfig::UpdateLead(UpdateLeadStep::Tags {
            tags: TagList::from_csv(tags),
            tags_action: action,
        })
    }

    #[tokio::test]
    async fn test_email_sends_personalized_and_logs() {
        let f = fixture();
        let outcome = f
            .runner
            .run(&email_step(), &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.directive, StepDirective::Advance);
        let sent = f.email.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Hi Ana");
        assert_eq!(sent[0].html, "About Nursing");
        assert_eq!(sent[0].from_name, "Admissions Team");
        let logs = f.crm.communications.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].channel, Channel::Email);
        assert_eq!(logs[0].provider_message_id.as_deref(), Some("email-0"));
    }

    #[tokio::test]
    async fn test_test_mode_calls_no_provider_and_writes_nothing() {
        let f = fixture();
        let ctx = ctx(&f.lead, true);
        let steps = [
            email_step(),
            StepConfig::parse("sms", json!({ "content": "Hi" })).unwrap(),
            tags_step("vip", TagsAction::Add),
            StepConfig::parse("create-task", json!({ "title": "Call {{leadName}}" })).unwrap(),
            StepConfig::parse(
                "internal-notification",
                json!({ "recipients": "specific", "recipientIds": [Uuid::now_v7()], "message": "hi" }),
            )
            .unwrap(),
        ];

        for step in &steps {
            let outcome = f.runner.run(step, &f.lead, &ctx).await.unwrap();
            assert!(outcome.success, "{step:?}: {:?}", outcome.error);
            assert_eq!(outcome.result["test_mode"], true);
        }

        assert_eq!(f.email.count(), 0);
        assert_eq!(f.sms.count(), 0);
        assert!(f.crm.untouched());
    }

    #[tokio::test]
    async fn test_email_without_address_is_soft_failure() {
        let mut f = fixture();
        f.lead.email = None;
        let outcome = f
            .runner
            .run(&email_step(), &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("lead has no email address"));
    }

    #[tokio::test]
    async fn test_sms_without_phone_is_soft_failure() {
        let mut f = fixture();
        f.lead.phone = Some(String::new());
        let step = StepConfig::parse("sms", json!({ "content": "Hi" })).unwrap();
        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(f.sms.count(), 0);
    }

    #[tokio::test]
    async fn test_sms_appends_opt_out_footer() {
        let f = fixture();
        let step = StepConfig::parse(
            "sms",
            json!({ "content": "Hi {{firstName}}", "includeOptOut": true }),
        )
        .unwrap();
        f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();

        let sent = f.sms.sent.lock().unwrap();
        assert_eq!(sent[0].body, "Hi Ana\n\nReply STOP to unsubscribe.");
        assert_eq!(sent[0].to, "+15550100");
        assert_eq!(f.crm.communications.lock().unwrap()[0].channel, Channel::Sms);
    }

    #[tokio::test]
    async fn test_missing_provider_credentials_are_fatal() {
        let f = fixture_with(SenderMode::Unconfigured);
        let err = f
            .runner
            .run(&email_step(), &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_provider_rejection_is_soft_failure() {
        let f = fixture_with(SenderMode::Reject);
        let outcome = f
            .runner
            .run(&email_step(), &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("recipient rejected"));
        assert!(f.crm.communications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wait_schedules_resume() {
        let f = fixture();
        let ctx = ctx(&f.lead, false);
        let step = StepConfig::Wait(WaitStep {
            wait_time: WaitDuration::new(3, WaitUnit::Days),
        });
        let outcome = f.runner.run(&step, &f.lead, &ctx).await.unwrap();
        assert_eq!(
            outcome.directive,
            StepDirective::Schedule(ctx.now + TimeDelta::hours(72))
        );
    }

    #[tokio::test]
    async fn test_out_of_range_dates_are_soft_failures() {
        let f = fixture();
        let ctx = ctx(&f.lead, false);

        let wait = StepConfig::Wait(WaitStep {
            wait_time: WaitDuration::new(4_000_000_000, WaitUnit::Weeks),
        });
        let outcome = f.runner.run(&wait, &f.lead, &ctx).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("waitTime out of range"));

        let task_due_in = |due_in_days| {
            StepConfig::CreateTask(CreateTaskStep {
                title: "Call".to_string(),
                description: None,
                due_in_days,
                priority: "medium".to_string(),
                assign_to: AssigneeTarget::CurrentUser,
                assignee_id: None,
            })
        };
        let outcome = f.runner.run(&task_due_in(1_000_000_000), &f.lead, &ctx).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("dueInDays out of range"));

        let outcome = f.runner.run(&task_due_in(-1), &f.lead, &ctx).await.unwrap();
        assert!(!outcome.success);
        assert!(f.crm.tasks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tag_merge_semantics() {
        let current = vec!["a".to_string(), "b".to_string()];
        let added = merge_tags(&current, &TagList::from_csv("b,c").0, TagsAction::Add);
        assert_eq!(added, vec!["a", "b", "c"]);

        let removed = merge_tags(&current, &TagList::from_csv("b").0, TagsAction::Remove);
        assert_eq!(removed, vec!["a"]);

        let replaced = merge_tags(&current, &TagList::from_csv("x, x, y").0, TagsAction::Replace);
        assert_eq!(replaced, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_update_lead_applies_patch() {
        let mut f = fixture();
        f.lead.tags = vec!["a".to_string(), "b".to_string()];
        *f.crm.leads.lock().unwrap() = vec![f.lead.clone()];

        let outcome = f
            .runner
            .run(&tags_step("b,c", TagsAction::Add), &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(f.crm.lead(f.lead.id).tags, vec!["a", "b", "c"]);

        let score = StepConfig::UpdateLead(UpdateLeadStep::Score { score_change: 10 });
        f.runner.run(&score, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert_eq!(f.crm.lead(f.lead.id).lead_score, 10);
    }

    #[tokio::test]
    async fn test_create_task_falls_back_to_current_user() {
        let f = fixture();
        let ctx = ctx(&f.lead, false);
        let step = StepConfig::parse(
            "create-task",
            json!({ "title": "Call {{leadName}}", "assignTo": "lead_advisor", "dueInDays": 2 }),
        )
        .unwrap();
        f.runner.run(&step, &f.lead, &ctx).await.unwrap();

        let tasks = f.crm.tasks.lock().unwrap();
        assert_eq!(tasks[0].title, "Call Ana Silva");
        assert_eq!(tasks[0].assigned_to, f.lead.user_id);
        assert_eq!(tasks[0].due_date, ctx.now + TimeDelta::days(2));
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_assign_advisor_load_balances_and_notifies() {
        let f = fixture();
        let busy = f.crm.add_advisor(f.lead.user_id, 9);
        let idle = f.crm.add_advisor(f.lead.user_id, 2);
        let step = StepConfig::parse("assign-advisor", json!({ "notifyAdvisor": true })).unwrap();

        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(f.crm.lead(f.lead.id).assigned_to, Some(idle));
        assert_ne!(f.crm.lead(f.lead.id).assigned_to, Some(busy));

        let advisors = f.crm.advisors.lock().unwrap();
        let bumped = advisors.iter().find(|a| a.advisor_id == idle).unwrap();
        assert_eq!(bumped.current_weekly_assignments, 3);
        let notes = f.crm.notifications.lock().unwrap();
        assert_eq!(notes[0].user_id, idle);
        assert_eq!(notes[0].kind, "lead_assignment");
    }

    #[tokio::test]
    async fn test_assign_advisor_without_candidates_is_soft_failure() {
        let f = fixture();
        let step = StepConfig::parse("assign-advisor", json!({})).unwrap();
        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("no eligible advisor available"));
    }

    #[tokio::test]
    async fn test_notification_targets() {
        let f = fixture();
        let to_advisor =
            StepConfig::parse("internal-notification", json!({ "message": "Lead {{leadName}}" }))
                .unwrap();
        let outcome = f
            .runner
            .run(&to_advisor, &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();
        assert!(!outcome.success);

        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let to_specific = StepConfig::parse(
            "internal-notification",
            json!({ "recipients": "specific", "recipientIds": format!("{a},{b}"), "message": "Lead {{leadName}}" }),
        )
        .unwrap();
        let outcome = f
            .runner
            .run(&to_specific, &f.lead, &ctx(&f.lead, false))
            .await
            .unwrap();
        assert!(outcome.success);
        let notes = f.crm.notifications.lock().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].user_id, b);
        assert_eq!(notes[0].message, "Lead Ana Silva");
    }

    #[tokio::test]
    async fn test_end_workflow_reason_defaults_to_completed() {
        let f = fixture();
        let step = StepConfig::EndWorkflow(EndWorkflowStep::default());
        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert_eq!(
            outcome.directive,
            StepDirective::Complete {
                exit_reason: "completed".to_string(),
                exited: false,
            }
        );
    }

    #[tokio::test]
    async fn test_condition_branches() {
        let f = fixture();
        let step = StepConfig::parse(
            "condition",
            json!({ "field": "status", "operator": "equals", "value": "qualified", "ifFalse": { "jumpTo": 4 } }),
        )
        .unwrap();
        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert_eq!(outcome.directive, StepDirective::JumpTo(4));
        assert_eq!(outcome.result["condition_met"], false);
    }

    #[tokio::test]
    async fn test_unsupported_step_is_skipped() {
        let f = fixture();
        let step = StepConfig::parse("webhook", json!({ "url": "https://example.com" })).unwrap();
        let outcome = f.runner.run(&step, &f.lead, &ctx(&f.lead, false)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result["skipped"], true);
        assert_eq!(outcome.directive, StepDirective::Advance);
    }
}
