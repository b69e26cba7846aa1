//! In-memory fakes of every repository and delivery trait, for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use leadflow_types::crm::{AdvisorRouting, CommunicationLog, Notification, Task};
use leadflow_types::enrollment::{Enrollment, StepExecution};
use leadflow_types::error::{DeliveryError, RepositoryError};
use leadflow_types::lead::{Lead, LeadQuery, LeadUpdate};
use leadflow_types::workflow::{StatsDelta, WorkflowDefinition};
use uuid::Uuid;

use crate::delivery::{DeliveryReceipt, EmailMessage, EmailSender, SmsMessage, SmsSender};
use crate::repository::crm::CrmRepository;
use crate::repository::enrollment::EnrollmentRepository;
use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryWorkflows {
    pub definitions: Mutex<HashMap<Uuid, WorkflowDefinition>>,
}

impl MemoryWorkflows {
    pub fn with(def: WorkflowDefinition) -> Self {
        let store = Self::default();
        store.definitions.lock().unwrap().insert(def.id, def);
        store
    }

    pub fn get(&self, id: &Uuid) -> WorkflowDefinition {
        self.definitions.lock().unwrap()[id].clone()
    }
}

impl WorkflowRepository for MemoryWorkflows {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions
            .lock()
            .unwrap()
            .insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.lock().unwrap().get(id).cloned())
    }

    async fn list_definitions(
        &self,
        user_id: Option<&Uuid>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<_> = self
            .definitions
            .lock()
            .unwrap()
            .values()
            .filter(|d| user_id.is_none_or(|u| &d.user_id == u))
            .cloned()
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn record_execution(
        &self,
        workflow_id: &Uuid,
        delta: &StatsDelta,
        executed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut defs = self.definitions.lock().unwrap();
        let def = defs.get_mut(workflow_id).ok_or(RepositoryError::NotFound)?;
        def.execution_stats.merge(delta, executed_at);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEnrollments {
    pub enrollments: Mutex<Vec<Enrollment>>,
    pub executions: Mutex<Vec<StepExecution>>,
    /// Leads whose enrollment insert fails with a query error.
    pub failing_leads: Mutex<HashSet<Uuid>>,
}

impl MemoryEnrollments {
    pub fn fail_for(&self, lead_id: Uuid) {
        self.failing_leads.lock().unwrap().insert(lead_id);
    }

    pub fn for_lead(&self, workflow_id: Uuid, lead_id: Uuid) -> Vec<Enrollment> {
        self.enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workflow_id == workflow_id && e.lead_id == lead_id)
            .cloned()
            .collect()
    }

    pub fn executions(&self) -> Vec<StepExecution> {
        self.executions.lock().unwrap().clone()
    }
}

impl EnrollmentRepository for MemoryEnrollments {
    async fn create_enrollment(
        &self,
        enrollment: &Enrollment,
        allow_existing: bool,
    ) -> Result<bool, RepositoryError> {
        if self.failing_leads.lock().unwrap().contains(&enrollment.lead_id) {
            return Err(RepositoryError::Query("simulated insert failure".to_string()));
        }
        let mut rows = self.enrollments.lock().unwrap();
        let exists = rows
            .iter()
            .any(|e| e.workflow_id == enrollment.workflow_id && e.lead_id == enrollment.lead_id);
        if exists && !allow_existing {
            return Ok(false);
        }
        rows.push(enrollment.clone());
        Ok(true)
    }

    async fn get_enrollment(&self, id: &Uuid) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .find(|e| &e.id == id)
            .cloned())
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<(), RepositoryError> {
        let mut rows = self.enrollments.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|e| e.id == enrollment.id)
            .ok_or(RepositoryError::NotFound)?;
        *row = enrollment.clone();
        Ok(())
    }

    async fn list_enrollments(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let rows = self.enrollments.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|e| &e.workflow_id == workflow_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut due: Vec<_> = self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_step_scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn record_step_execution(&self, execution: &StepExecution) -> Result<(), RepositoryError> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn list_step_executions(
        &self,
        enrollment_id: &Uuid,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.enrollment_id == enrollment_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryCrm {
    pub leads: Mutex<Vec<Lead>>,
    pub advisors: Mutex<Vec<AdvisorRouting>>,
    pub tasks: Mutex<Vec<Task>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub communications: Mutex<Vec<CommunicationLog>>,
    /// Number of `update_lead` calls that reached the store.
    pub lead_writes: Mutex<usize>,
}

impl MemoryCrm {
    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let crm = Self::default();
        *crm.leads.lock().unwrap() = leads;
        crm
    }

    pub fn add_advisor(&self, user_id: Uuid, weekly: u32) -> Uuid {
        let advisor_id = Uuid::now_v7();
        self.advisors.lock().unwrap().push(AdvisorRouting {
            advisor_id,
            user_id,
            routing_enabled: true,
            current_weekly_assignments: weekly,
        });
        advisor_id
    }

    pub fn lead(&self, id: Uuid) -> Lead {
        self.leads
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .unwrap()
    }

    /// Whether anything besides reads happened.
    pub fn untouched(&self) -> bool {
        *self.lead_writes.lock().unwrap() == 0
            && self.tasks.lock().unwrap().is_empty()
            && self.notifications.lock().unwrap().is_empty()
            && self.communications.lock().unwrap().is_empty()
    }
}

impl CrmRepository for MemoryCrm {
    async fn get_lead(&self, id: &Uuid) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.leads.lock().unwrap().iter().find(|l| &l.id == id).cloned())
    }

    async fn get_leads(&self, ids: &[Uuid]) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn find_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, RepositoryError> {
        let matches_any = |filter: &[String], value: &Option<String>| {
            filter.is_empty() || value.as_ref().is_some_and(|v| filter.contains(v))
        };
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.user_id == query.user_id)
            .filter(|l| matches_any(&query.statuses, &l.status))
            .filter(|l| matches_any(&query.sources, &l.source))
            .filter(|l| query.tags.is_empty() || l.tags.iter().any(|t| query.tags.contains(t)))
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn update_lead(&self, id: &Uuid, update: &LeadUpdate) -> Result<(), RepositoryError> {
        let mut leads = self.leads.lock().unwrap();
        let lead = leads
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or(RepositoryError::NotFound)?;
        lead.apply(update);
        *self.lead_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn least_loaded_advisor(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<AdvisorRouting>, RepositoryError> {
        Ok(self
            .advisors
            .lock()
            .unwrap()
            .iter()
            .filter(|a| &a.user_id == user_id && a.routing_enabled)
            .min_by_key(|a| a.current_weekly_assignments)
            .cloned())
    }

    async fn record_advisor_assignment(&self, advisor_id: &Uuid) -> Result<(), RepositoryError> {
        if let Some(advisor) = self
            .advisors
            .lock()
            .unwrap()
            .iter_mut()
            .find(|a| &a.advisor_id == advisor_id)
        {
            advisor.current_weekly_assignments += 1;
        }
        Ok(())
    }

    async fn create_task(&self, task: &Task) -> Result<(), RepositoryError> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> Result<(), RepositoryError> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn log_communication(&self, entry: &CommunicationLog) -> Result<(), RepositoryError> {
        self.communications.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Senders
// ---------------------------------------------------------------------------

/// How a fake sender responds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SenderMode {
    #[default]
    Accept,
    Reject,
    Unconfigured,
}

impl SenderMode {
    fn respond(self, provider: &str, sent: usize) -> Result<DeliveryReceipt, DeliveryError> {
        match self {
            SenderMode::Accept => Ok(DeliveryReceipt {
                provider_message_id: Some(format!("{provider}-{sent}")),
            }),
            SenderMode::Reject => Err(DeliveryError::Provider {
                provider: provider.to_string(),
                message: "recipient rejected".to_string(),
            }),
            SenderMode::Unconfigured => Err(DeliveryError::NotConfigured {
                provider: provider.to_string(),
                message: "credentials missing".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeEmail {
    pub mode: SenderMode,
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl FakeEmail {
    pub fn with_mode(mode: SenderMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl EmailSender for FakeEmail {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        let receipt = self.mode.respond("email", sent.len())?;
        sent.push(message.clone());
        Ok(receipt)
    }
}

#[derive(Default)]
pub struct FakeSms {
    pub mode: SenderMode,
    pub sent: Mutex<Vec<SmsMessage>>,
}

impl FakeSms {
    pub fn with_mode(mode: SenderMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl SmsSender for FakeSms {
    async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        let receipt = self.mode.respond("sms", sent.len())?;
        sent.push(message.clone());
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// A lead with a name, email, phone and program.
pub fn sample_lead(user_id: Uuid) -> Lead {
    let mut lead = Lead::new(Uuid::now_v7(), user_id);
    lead.first_name = Some("Ana".to_string());
    lead.last_name = Some("Silva".to_string());
    lead.email = Some("ana@example.com".to_string());
    lead.phone = Some("+15550100".to_string());
    lead.status = Some("new".to_string());
    lead.program_interest = Some("Nursing".to_string());
    lead
}

/// Build a definition from wire-format steps.
pub fn workflow(user_id: Uuid, steps: serde_json::Value, re_enrollment_allowed: bool) -> WorkflowDefinition {
    let json = serde_json::json!({
        "id": Uuid::now_v7(),
        "user_id": user_id,
        "name": "Test workflow",
        "status": "active",
        "steps": steps,
        "enrollmentSettings": { "reEnrollmentAllowed": re_enrollment_allowed },
    });
    WorkflowDefinition::from_json(&json.to_string()).unwrap()
}
