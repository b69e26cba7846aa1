//! Enrollment and step execution tracking types.
//!
//! An [`Enrollment`] is one lead's traversal of one workflow. Every attempted
//! step leaves an immutable [`StepExecution`] audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            other => Err(format!("invalid enrollment status: '{other}'")),
        }
    }
}

/// How the enrollment was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSource {
    Execution,
    Test,
}

/// Metadata recorded when an enrollment is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentMetadata {
    pub enrolled_via: EnrollmentSource,
    #[serde(default)]
    pub test_mode: bool,
}

impl EnrollmentMetadata {
    pub fn for_mode(test_mode: bool) -> Self {
        Self {
            enrolled_via: if test_mode {
                EnrollmentSource::Test
            } else {
                EnrollmentSource::Execution
            },
            test_mode,
        }
    }
}

/// One successfully executed step in an enrollment's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepHistoryEntry {
    pub step_index: usize,
    pub step_type: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub result: Value,
}

/// A lead's traversal of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Uuid,
    pub user_id: Uuid,
    /// 0-based cursor into the workflow's actionable steps.
    pub current_step_index: usize,
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub step_history: Vec<StepHistoryEntry>,
    pub metadata: EnrollmentMetadata,
    /// Set while paused on a wait step.
    #[serde(default)]
    pub next_step_scheduled_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_reason: Option<String>,
}

impl Enrollment {
    /// A fresh active enrollment positioned at the first actionable step.
    pub fn new(workflow_id: Uuid, lead_id: Uuid, user_id: Uuid, test_mode: bool) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            lead_id,
            user_id,
            current_step_index: 0,
            status: EnrollmentStatus::Active,
            step_history: Vec::new(),
            metadata: EnrollmentMetadata::for_mode(test_mode),
            next_step_scheduled_at: None,
            enrolled_at: Utc::now(),
            completed_at: None,
            exit_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Whether a scheduler may advance this enrollment at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_step_scheduled_at.is_none_or(|at| at <= now)
    }
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepExecutionStatus::Completed => write!(f, "completed"),
            StepExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable audit record of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub step_index: usize,
    pub step_type: String,
    /// Snapshot of the step configuration at execution time.
    pub step_config: Value,
    pub status: StepExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}
