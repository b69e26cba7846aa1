//! CRM records written as side effects of workflow steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A follow-up task for a CRM user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Owner of the workflow that created the task.
    pub user_id: Uuid,
    pub lead_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: String,
    pub status: TaskStatus,
    pub assigned_to: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// An in-app notification for a CRM user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    /// Notification category, e.g. `workflow` or `lead_assignment`.
    pub kind: String,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Uuid, title: String, message: String, kind: &str, lead_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            title,
            message,
            kind: kind.to_string(),
            lead_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Outbound message logged against a lead's communication history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationLog {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    /// Always `outbound` for engine-sent messages.
    pub direction: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    pub status: String,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommunicationLog {
    pub fn outbound(
        lead_id: Uuid,
        user_id: Uuid,
        channel: Channel,
        subject: Option<String>,
        content: String,
        provider_message_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            lead_id,
            user_id,
            channel,
            direction: "outbound".to_string(),
            subject,
            content,
            status: "sent".to_string(),
            provider_message_id,
            created_at: Utc::now(),
        }
    }
}

/// Routing state of one advisor, used for load-balanced assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorRouting {
    pub advisor_id: Uuid,
    /// The CRM account the advisor belongs to.
    pub user_id: Uuid,
    pub routing_enabled: bool,
    pub current_weekly_assignments: u32,
}
