//! Request and response shapes of a workflow run.
//!
//! These are the JSON bodies of the execute-workflow endpoint, so field names
//! follow the caller's camelCase convention.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of an execute-workflow call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub workflow_id: Uuid,
    /// Explicit leads to process. When absent, the workflow's audience
    /// filter selects the leads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub test_mode: bool,
    pub user_id: Uuid,
}

/// Per-lead outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadOutcomeStatus {
    Enrolled,
    Skipped,
    Failed,
}

/// What happened to one lead during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadOutcome {
    pub lead_id: Uuid,
    pub status: LeadOutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LeadOutcome {
    pub fn enrolled(lead_id: Uuid, enrollment_id: Uuid) -> Self {
        Self {
            lead_id,
            status: LeadOutcomeStatus::Enrolled,
            enrollment_id: Some(enrollment_id),
            reason: None,
            error: None,
        }
    }

    pub fn skipped(lead_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            lead_id,
            status: LeadOutcomeStatus::Skipped,
            enrollment_id: None,
            reason: Some(reason.into()),
            error: None,
        }
    }

    pub fn failed(lead_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            lead_id,
            status: LeadOutcomeStatus::Failed,
            enrollment_id: None,
            reason: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate result of one execute-workflow invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub total: u64,
    pub enrolled: u64,
    pub skipped: u64,
    pub failed: u64,
    pub details: Vec<LeadOutcome>,
}

impl ExecutionResult {
    /// Record an outcome and bump the matching counter.
    pub fn record(&mut self, outcome: LeadOutcome) {
        match outcome.status {
            LeadOutcomeStatus::Enrolled => self.enrolled += 1,
            LeadOutcomeStatus::Skipped => self.skipped += 1,
            LeadOutcomeStatus::Failed => self.failed += 1,
        }
        self.details.push(outcome);
    }
}

/// Result of one scheduler pass over due enrollments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Due enrollments picked up.
    pub processed: u64,
    /// Enrollments whose step succeeded.
    pub advanced: u64,
    /// Enrollments that reached a terminal state in this pass.
    pub completed: u64,
    /// Enrollments whose step or bookkeeping failed.
    pub failed: u64,
}
