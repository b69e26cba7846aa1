//! Lead domain types.
//!
//! A lead is owned by the CRM. The workflow engine reads it for
//! personalization and branching and may patch classification and ownership
//! fields through [`LeadUpdate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prospective student tracked by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Owning CRM user.
    pub user_id: Uuid,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lead_score: i64,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub program_interest: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Advisor currently responsible for the lead.
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a lead with only identity and ownership set.
    pub fn new(id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            status: None,
            source: None,
            tags: Vec::new(),
            lead_score: 0,
            priority: None,
            program_interest: None,
            city: None,
            country: None,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", trimmed. Empty when both names are missing.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }

    /// Phone number if present and not blank.
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Email address if present and not blank.
    pub fn contact_email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Apply a patch in memory. Used for dry runs and by in-memory stores.
    pub fn apply(&mut self, update: &LeadUpdate) {
        if let Some(status) = &update.status {
            self.status = Some(status.clone());
        }
        if let Some(tags) = &update.tags {
            self.tags = tags.clone();
        }
        if let Some(score) = update.lead_score {
            self.lead_score = score;
        }
        if let Some(priority) = &update.priority {
            self.priority = Some(priority.clone());
        }
        if let Some(program) = &update.program_interest {
            self.program_interest = Some(program.clone());
        }
        if let Some(advisor) = update.assigned_to {
            self.assigned_to = Some(advisor);
        }
        self.updated_at = Utc::now();
    }
}

/// Sparse patch applied to a lead. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_interest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
}

impl LeadUpdate {
    pub fn is_empty(&self) -> bool {
        self == &LeadUpdate::default()
    }
}

/// Audience query used when no explicit lead IDs are given.
#[derive(Debug, Clone, Default)]
pub struct LeadQuery {
    /// Only leads owned by this user.
    pub user_id: Uuid,
    /// Match any of these statuses (empty = no filter).
    pub statuses: Vec<String>,
    /// Match any of these sources (empty = no filter).
    pub sources: Vec<String>,
    /// Match leads sharing at least one tag (empty = no filter).
    pub tags: Vec<String>,
    pub limit: u32,
}
