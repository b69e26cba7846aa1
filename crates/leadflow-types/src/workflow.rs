//! Workflow domain types for Leadflow.
//!
//! Workflows are authored in the builder as an ordered list of loosely typed
//! `{ type, config }` elements. This module turns that wire format into a
//! [`WorkflowDefinition`] whose steps carry one strongly typed configuration
//! per step kind ([`StepConfig`]). All shape and semantic checks happen while
//! the definition is deserialized, so an authoring mistake is reported before
//! any lead is processed.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::WorkflowError;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A validated workflow definition.
///
/// Deserializes from (and serializes back to) the builder's wire format via
/// [`RawWorkflowDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowDefinition", into = "RawWorkflowDefinition")]
pub struct WorkflowDefinition {
    pub id: Uuid,
    /// Owning CRM user.
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: WorkflowStatus,
    /// Authored steps in order, trigger markers included.
    pub steps: Vec<WorkflowStep>,
    pub enrollment_settings: EnrollmentSettings,
    pub execution_stats: ExecutionStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Parse and validate a definition from JSON text.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        let raw: RawWorkflowDefinition =
            serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Steps the engine executes, in order. Trigger elements are structural
    /// markers and never appear here; the enrollment cursor indexes into
    /// this sequence.
    pub fn actionable_steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.steps.iter().filter(|s| !s.config.is_trigger())
    }

    /// The actionable step at `index`, if any.
    pub fn actionable_step(&self, index: usize) -> Option<&WorkflowStep> {
        self.actionable_steps().nth(index)
    }

    /// Number of actionable steps.
    pub fn actionable_len(&self) -> usize {
        self.actionable_steps().count()
    }

    /// Trigger markers declared by the author.
    pub fn triggers(&self) -> impl Iterator<Item = &TriggerStep> {
        self.steps.iter().filter_map(|s| match &s.config {
            StepConfig::Trigger(t) => Some(t),
            _ => None,
        })
    }
}

/// Lifecycle status of a workflow in the builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

/// Who gets enrolled and whether they may be enrolled again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSettings {
    #[serde(default, alias = "audienceFilter")]
    pub audience_filter: AudienceFilter,
    #[serde(default, alias = "reEnrollmentAllowed")]
    pub re_enrollment_allowed: bool,
}

/// Audience filter applied when the caller does not pass explicit lead IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceFilter {
    #[serde(default, alias = "status")]
    pub statuses: Vec<String>,
    #[serde(default, alias = "source")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Aggregate counters maintained by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    #[serde(default, alias = "totalEnrolled")]
    pub total_enrolled: u64,
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub exited: u64,
    #[serde(default, alias = "lastExecutedAt")]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    /// Fold one invocation's counters into the persisted totals.
    pub fn merge(&mut self, delta: &StatsDelta, executed_at: DateTime<Utc>) {
        self.total_enrolled += delta.enrolled;
        self.active = (self.active + delta.enrolled).saturating_sub(delta.completed + delta.exited);
        self.completed += delta.completed;
        self.exited += delta.exited;
        self.last_executed_at = Some(executed_at);
    }
}

/// Counter changes produced by one runner or scheduler invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    /// New enrollments created.
    pub enrolled: u64,
    /// Enrollments that ran out of steps or hit an `end-workflow` step.
    pub completed: u64,
    /// Enrollments that left early (e.g. a failed condition with `ifFalse: end`).
    pub exited: u64,
}

impl StatsDelta {
    pub fn is_empty(&self) -> bool {
        self.enrolled == 0 && self.completed == 0 && self.exited == 0
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One validated step of a workflow.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    /// Builder node ID, when the author's tool assigned one.
    pub id: Option<String>,
    /// Builder canvas position (opaque to the engine).
    pub position: Option<Value>,
    pub config: StepConfig,
}

impl WorkflowStep {
    pub fn new(config: StepConfig) -> Self {
        Self {
            id: None,
            position: None,
            config,
        }
    }

    pub fn step_type(&self) -> &str {
        self.config.step_type()
    }
}

/// Typed configuration, one variant per step kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    Trigger(TriggerStep),
    Email(EmailStep),
    Sms(SmsStep),
    Wait(WaitStep),
    Condition(ConditionStep),
    UpdateLead(UpdateLeadStep),
    CreateTask(CreateTaskStep),
    AssignAdvisor(AssignAdvisorStep),
    InternalNotification(NotificationStep),
    EndWorkflow(EndWorkflowStep),
    /// A step type this engine version does not know. Kept verbatim and
    /// skipped at execution time.
    Unsupported { step_type: String, config: Value },
}

impl StepConfig {
    /// The wire name of this step type.
    pub fn step_type(&self) -> &str {
        match self {
            StepConfig::Trigger(_) => "trigger",
            StepConfig::Email(_) => "email",
            StepConfig::Sms(_) => "sms",
            StepConfig::Wait(_) => "wait",
            StepConfig::Condition(_) => "condition",
            StepConfig::UpdateLead(_) => "update-lead",
            StepConfig::CreateTask(_) => "create-task",
            StepConfig::AssignAdvisor(_) => "assign-advisor",
            StepConfig::InternalNotification(_) => "internal-notification",
            StepConfig::EndWorkflow(_) => "end-workflow",
            StepConfig::Unsupported { step_type, .. } => step_type,
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, StepConfig::Trigger(_))
    }

    /// Parse a wire `{ type, config }` pair.
    pub fn parse(step_type: &str, config: Value) -> Result<Self, String> {
        // Builders emit `null` for steps without settings.
        let config = if config.is_null() {
            Value::Object(Default::default())
        } else {
            config
        };

        fn typed<T: serde::de::DeserializeOwned>(config: Value) -> Result<T, String> {
            serde_json::from_value(config).map_err(|e| e.to_string())
        }

        let parsed = match step_type {
            "trigger" => StepConfig::Trigger(typed(config)?),
            "email" => StepConfig::Email(typed(config)?),
            "sms" => StepConfig::Sms(typed(config)?),
            "wait" => StepConfig::Wait(typed(config)?),
            "condition" => StepConfig::Condition(typed(config)?),
            "update-lead" => StepConfig::UpdateLead(typed(config)?),
            "create-task" => StepConfig::CreateTask(typed(config)?),
            "assign-advisor" => StepConfig::AssignAdvisor(typed(config)?),
            "internal-notification" => StepConfig::InternalNotification(typed(config)?),
            "end-workflow" => StepConfig::EndWorkflow(typed(config)?),
            other => StepConfig::Unsupported {
                step_type: other.to_string(),
                config,
            },
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Semantic checks that serde cannot express.
    fn validate(&self) -> Result<(), String> {
        match self {
            StepConfig::Email(email) => {
                if email.subject.trim().is_empty() {
                    return Err("email subject must not be empty".to_string());
                }
                if email.content.trim().is_empty() {
                    return Err("email content must not be empty".to_string());
                }
            }
            StepConfig::Sms(sms) => {
                if sms.content.trim().is_empty() {
                    return Err("sms content must not be empty".to_string());
                }
            }
            StepConfig::CreateTask(task) => {
                if task.title.trim().is_empty() {
                    return Err("task title must not be empty".to_string());
                }
                if task.assign_to == AssigneeTarget::Specific && task.assignee_id.is_none() {
                    return Err("assignTo 'specific' requires assigneeId".to_string());
                }
                if !(0..=MAX_TASK_DUE_DAYS).contains(&task.due_in_days) {
                    return Err(format!(
                        "dueInDays must be between 0 and {MAX_TASK_DUE_DAYS}, got {}",
                        task.due_in_days
                    ));
                }
            }
            StepConfig::Wait(wait) => {
                if wait.wait_time.as_delta().is_none() {
                    return Err(format!(
                        "waitTime must not exceed {MAX_WAIT_DAYS} days, got {} {:?}",
                        wait.wait_time.value, wait.wait_time.unit
                    ));
                }
            }
            StepConfig::AssignAdvisor(assign) => {
                if assign.assignment_type == AdvisorSelection::Specific
                    && assign.advisor_id.is_none()
                {
                    return Err("assignmentType 'specific' requires advisorId".to_string());
                }
            }
            StepConfig::InternalNotification(notify) => {
                if notify.message.trim().is_empty() {
                    return Err("notification message must not be empty".to_string());
                }
                if notify.recipients == RecipientTarget::Specific
                    && notify.recipient_ids.0.is_empty()
                {
                    return Err("recipients 'specific' requires recipientIds".to_string());
                }
            }
            StepConfig::Trigger(_)
            | StepConfig::Condition(_)
            | StepConfig::UpdateLead(_)
            | StepConfig::EndWorkflow(_)
            | StepConfig::Unsupported { .. } => {}
        }
        Ok(())
    }

    /// Snapshot of the configuration in wire format.
    pub fn to_value(&self) -> Value {
        let value = match self {
            StepConfig::Trigger(c) => serde_json::to_value(c),
            StepConfig::Email(c) => serde_json::to_value(c),
            StepConfig::Sms(c) => serde_json::to_value(c),
            StepConfig::Wait(c) => serde_json::to_value(c),
            StepConfig::Condition(c) => serde_json::to_value(c),
            StepConfig::UpdateLead(c) => serde_json::to_value(c),
            StepConfig::CreateTask(c) => serde_json::to_value(c),
            StepConfig::AssignAdvisor(c) => serde_json::to_value(c),
            StepConfig::InternalNotification(c) => serde_json::to_value(c),
            StepConfig::EndWorkflow(c) => serde_json::to_value(c),
            StepConfig::Unsupported { config, .. } => Ok(config.clone()),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Trigger marker. The engine records it but never executes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, Value>,
}

/// Send a personalized email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStep {
    pub subject: String,
    #[serde(alias = "body")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Send a personalized SMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsStep {
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default)]
    pub include_opt_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_out_text: Option<String>,
}

/// Pause the enrollment until a scheduler resumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitStep {
    #[serde(default)]
    pub wait_time: WaitDuration,
}

/// `{ value, unit }` wait duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitDuration {
    #[serde(default = "default_wait_value")]
    pub value: u32,
    #[serde(default)]
    pub unit: WaitUnit,
}

fn default_wait_value() -> u32 {
    1
}

impl Default for WaitDuration {
    fn default() -> Self {
        Self {
            value: default_wait_value(),
            unit: WaitUnit::default(),
        }
    }
}

impl WaitDuration {
    pub fn new(value: u32, unit: WaitUnit) -> Self {
        Self { value, unit }
    }

    /// `None` when the duration is longer than [`MAX_WAIT_DAYS`].
    pub fn as_delta(&self) -> Option<TimeDelta> {
        let value = i64::from(self.value);
        let delta = match self.unit {
            WaitUnit::Minutes => TimeDelta::try_minutes(value),
            WaitUnit::Hours => TimeDelta::try_hours(value),
            WaitUnit::Days => TimeDelta::try_days(value),
            WaitUnit::Weeks => TimeDelta::try_weeks(value),
        }?;
        (delta <= TimeDelta::days(MAX_WAIT_DAYS)).then_some(delta)
    }

    /// The instant an enrollment paused at `now` becomes due again.
    pub fn resume_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.as_delta()?)
    }
}

/// Longest wait a step may declare.
pub const MAX_WAIT_DAYS: i64 = 3650;

/// Latest due date a created task may declare, in days from now.
pub const MAX_TASK_DUE_DAYS: i64 = 3650;

/// Wait unit. Unrecognized units fall back to days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum WaitUnit {
    Minutes,
    Hours,
    #[default]
    Days,
    Weeks,
}

impl From<String> for WaitUnit {
    fn from(unit: String) -> Self {
        match unit.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => WaitUnit::Minutes,
            "hour" | "hours" => WaitUnit::Hours,
            "week" | "weeks" => WaitUnit::Weeks,
            _ => WaitUnit::Days,
        }
    }
}

/// Branch on a lead field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionStep {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub if_false: BranchAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Status,
    Source,
    Priority,
    #[serde(alias = "programInterest")]
    ProgramInterest,
    City,
    Country,
    Email,
    Phone,
    #[serde(alias = "leadScore", alias = "score")]
    LeadScore,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

/// What a condition step does when it evaluates to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BranchAction {
    /// Fall through to the next step.
    #[default]
    Continue,
    /// Leave the workflow.
    End,
    /// Continue at the given actionable step index.
    JumpTo(usize),
}

/// Mutate one lead attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "updateType",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum UpdateLeadStep {
    Status {
        status: String,
    },
    Tags {
        tags: TagList,
        #[serde(default)]
        tags_action: TagsAction,
    },
    Score {
        score_change: i64,
    },
    Priority {
        priority: String,
    },
    #[serde(alias = "program")]
    ProgramInterest {
        program_interest: String,
    },
}

/// Tags given either as a comma separated string or as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TagInput", into = "Vec<String>")]
pub struct TagList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TagInput {
    List(Vec<String>),
    Csv(String),
}

impl From<TagInput> for TagList {
    fn from(input: TagInput) -> Self {
        let raw = match input {
            TagInput::List(items) => items,
            TagInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        TagList(
            raw.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }
}

impl From<TagList> for Vec<String> {
    fn from(list: TagList) -> Self {
        list.0
    }
}

impl TagList {
    pub fn from_csv(csv: &str) -> Self {
        TagInput::Csv(csv.to_string()).into()
    }
}

/// How an update-lead step combines configured tags with the lead's tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TagsAction {
    Add,
    Remove,
    #[default]
    Replace,
}

impl From<String> for TagsAction {
    fn from(action: String) -> Self {
        match action.trim().to_ascii_lowercase().as_str() {
            "add" => TagsAction::Add,
            "remove" => TagsAction::Remove,
            _ => TagsAction::Replace,
        }
    }
}

/// Create a follow-up task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskStep {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_due_in_days")]
    pub due_in_days: i64,
    #[serde(default = "default_task_priority")]
    pub priority: String,
    #[serde(default)]
    pub assign_to: AssigneeTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
}

fn default_due_in_days() -> i64 {
    1
}

fn default_task_priority() -> String {
    "medium".to_string()
}

/// Who receives a created task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum AssigneeTarget {
    LeadAdvisor,
    Specific,
    /// The user who owns the workflow run.
    #[default]
    CurrentUser,
}

impl From<String> for AssigneeTarget {
    fn from(target: String) -> Self {
        match target.as_str() {
            "lead_advisor" => AssigneeTarget::LeadAdvisor,
            "specific" => AssigneeTarget::Specific,
            _ => AssigneeTarget::CurrentUser,
        }
    }
}

/// Assign the lead to an advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAdvisorStep {
    #[serde(default)]
    pub assignment_type: AdvisorSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<Uuid>,
    #[serde(default)]
    pub notify_advisor: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum AdvisorSelection {
    Specific,
    /// Least-loaded advisor with routing enabled.
    #[default]
    LoadBalance,
}

impl From<String> for AdvisorSelection {
    fn from(selection: String) -> Self {
        match selection.as_str() {
            "specific" => AdvisorSelection::Specific,
            _ => AdvisorSelection::LoadBalance,
        }
    }
}

/// Notify CRM users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStep {
    #[serde(default)]
    pub recipients: RecipientTarget,
    #[serde(default)]
    pub recipient_ids: RecipientIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientTarget {
    #[default]
    LeadAdvisor,
    Specific,
}

/// User IDs given as a comma separated string or an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TagList", into = "Vec<String>")]
pub struct RecipientIds(pub Vec<Uuid>);

impl TryFrom<TagList> for RecipientIds {
    type Error = String;

    fn try_from(list: TagList) -> Result<Self, Self::Error> {
        list.0
            .iter()
            .map(|id| {
                id.parse::<Uuid>()
                    .map_err(|e| format!("invalid recipient id '{id}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RecipientIds)
    }
}

impl From<RecipientIds> for Vec<String> {
    fn from(ids: RecipientIds) -> Self {
        ids.0.iter().map(Uuid::to_string).collect()
    }
}

/// Terminal step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndWorkflowStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Builder wire format of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWorkflowDefinition {
    pub id: Uuid,
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<RawStep>,
    #[serde(default, alias = "enrollmentSettings")]
    pub enrollment_settings: EnrollmentSettings,
    #[serde(default, alias = "executionStats")]
    pub execution_stats: ExecutionStats,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Builder wire format of a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

impl TryFrom<RawWorkflowDefinition> for WorkflowDefinition {
    type Error = WorkflowError;

    fn try_from(raw: RawWorkflowDefinition) -> Result<Self, Self::Error> {
        let steps = raw
            .steps
            .into_iter()
            .enumerate()
            .map(|(position, step)| {
                let config = StepConfig::parse(&step.step_type, step.config).map_err(|message| {
                    WorkflowError::InvalidStep {
                        position,
                        step_type: step.step_type.clone(),
                        message,
                    }
                })?;
                Ok(WorkflowStep {
                    id: step.id,
                    position: step.position,
                    config,
                })
            })
            .collect::<Result<Vec<_>, WorkflowError>>()?;
        check_backward_jumps(&steps)?;

        Ok(Self {
            id: raw.id,
            user_id: raw.user_id,
            name: raw.name,
            description: raw.description,
            status: raw.status,
            steps,
            enrollment_settings: raw.enrollment_settings,
            execution_stats: raw.execution_stats,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

/// A condition that jumps back to itself or an earlier step must have a
/// wait step inside the loop, otherwise the loop runs again on every tick.
fn check_backward_jumps(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    let actionable: Vec<(usize, &StepConfig)> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.config.is_trigger())
        .map(|(position, s)| (position, &s.config))
        .collect();

    for (index, (position, config)) in actionable.iter().enumerate() {
        let StepConfig::Condition(ConditionStep {
            if_false: BranchAction::JumpTo(target),
            ..
        }) = config
        else {
            continue;
        };
        if *target > index {
            continue;
        }
        let has_wait = actionable[*target..=index]
            .iter()
            .any(|(_, c)| matches!(c, StepConfig::Wait(_)));
        if !has_wait {
            return Err(WorkflowError::InvalidStep {
                position: *position,
                step_type: "condition".to_string(),
                message: format!(
                    "jumpTo {target} loops back without a wait step between {target} and {index}"
                ),
            });
        }
    }
    Ok(())
}

impl From<WorkflowDefinition> for RawWorkflowDefinition {
    fn from(def: WorkflowDefinition) -> Self {
        Self {
            id: def.id,
            user_id: def.user_id,
            name: def.name,
            description: def.description,
            status: def.status,
            steps: def
                .steps
                .into_iter()
                .map(|step| RawStep {
                    id: step.id,
                    step_type: step.config.step_type().to_string(),
                    config: step.config.to_value(),
                    position: step.position,
                })
                .collect(),
            enrollment_settings: def.enrollment_settings,
            execution_stats: def.execution_stats,
            created_at: def.created_at,
            updated_at: def.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
