//! SQLite CRM repository: leads, advisor routing and step side-effect records.

use chrono::Utc;
use leadflow_core::repository::crm::CrmRepository;
use leadflow_types::crm::{AdvisorRouting, CommunicationLog, Notification, Task};
use leadflow_types::error::RepositoryError;
use leadflow_types::lead::{Lead, LeadQuery, LeadUpdate};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, placeholders, query_error, to_json};

/// SQLite-backed implementation of `CrmRepository`.
pub struct SqliteCrmRepository {
    pool: DatabasePool,
}

impl SqliteCrmRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a lead. Used by bulk import.
    pub async fn upsert_lead(&self, lead: &Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO leads
               (id, user_id, first_name, last_name, email, phone, status, source, tags,
                lead_score, priority, program_interest, city, country, assigned_to,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 email = excluded.email,
                 phone = excluded.phone,
                 status = excluded.status,
                 source = excluded.source,
                 tags = excluded.tags,
                 lead_score = excluded.lead_score,
                 priority = excluded.priority,
                 program_interest = excluded.program_interest,
                 city = excluded.city,
                 country = excluded.country,
                 assigned_to = excluded.assigned_to,
                 updated_at = excluded.updated_at"#,
        )
        .bind(lead.id.to_string())
        .bind(lead.user_id.to_string())
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.status)
        .bind(&lead.source)
        .bind(to_json(&lead.tags)?)
        .bind(lead.lead_score)
        .bind(&lead.priority)
        .bind(&lead.program_interest)
        .bind(&lead.city)
        .bind(&lead.country)
        .bind(lead.assigned_to.map(|id| id.to_string()))
        .bind(format_datetime(&lead.created_at))
        .bind(format_datetime(&lead.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    /// Insert or replace an advisor's routing row. Used by bulk import.
    pub async fn upsert_advisor(&self, advisor: &AdvisorRouting) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO advisor_routing
               (advisor_id, user_id, routing_enabled, current_weekly_assignments)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(advisor_id) DO UPDATE SET
                 user_id = excluded.user_id,
                 routing_enabled = excluded.routing_enabled,
                 current_weekly_assignments = excluded.current_weekly_assignments"#,
        )
        .bind(advisor.advisor_id.to_string())
        .bind(advisor.user_id.to_string())
        .bind(advisor.routing_enabled)
        .bind(i64::from(advisor.current_weekly_assignments))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

const LEAD_COLUMNS: &str = "id, user_id, first_name, last_name, email, phone, status, source, \
     tags, lead_score, priority, program_interest, city, country, assigned_to, created_at, updated_at";

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct LeadRow {
    id: String,
    user_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    status: Option<String>,
    source: Option<String>,
    tags: String,
    lead_score: i64,
    priority: Option<String>,
    program_interest: Option<String>,
    city: Option<String>,
    country: Option<String>,
    assigned_to: Option<String>,
    created_at: String,
    updated_at: String,
}

impl LeadRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            status: row.try_get("status")?,
            source: row.try_get("source")?,
            tags: row.try_get("tags")?,
            lead_score: row.try_get("lead_score")?,
            priority: row.try_get("priority")?,
            program_interest: row.try_get("program_interest")?,
            city: row.try_get("city")?,
            country: row.try_get("country")?,
            assigned_to: row.try_get("assigned_to")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_lead(self) -> Result<Lead, RepositoryError> {
        Ok(Lead {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            status: self.status,
            source: self.source,
            tags: parse_json(&self.tags, "tags")?,
            lead_score: self.lead_score,
            priority: self.priority,
            program_interest: self.program_interest,
            city: self.city,
            country: self.country,
            assigned_to: self.assigned_to.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn collect_leads(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Lead>, RepositoryError> {
    rows.iter()
        .map(|row| LeadRow::from_row(row).map_err(query_error)?.into_lead())
        .collect()
}

/// A bound value of a dynamically built statement.
enum Param {
    Text(String),
    Int(i64),
}

// ---------------------------------------------------------------------------
// CrmRepository impl
// ---------------------------------------------------------------------------

impl CrmRepository for SqliteCrmRepository {
    async fn get_lead(&self, id: &Uuid) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = LeadRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_lead()?))
            }
            None => Ok(None),
        }
    }

    async fn get_leads(&self, ids: &[Uuid]) -> Result<Vec<Lead>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        collect_leads(&rows)
    }

    async fn find_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, RepositoryError> {
        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE user_id = ?");
        let mut params: Vec<String> = vec![query.user_id.to_string()];

        if !query.statuses.is_empty() {
            sql.push_str(&format!(" AND status IN ({})", placeholders(query.statuses.len())));
            params.extend(query.statuses.iter().cloned());
        }
        if !query.sources.is_empty() {
            sql.push_str(&format!(" AND source IN ({})", placeholders(query.sources.len())));
            params.extend(query.sources.iter().cloned());
        }
        if !query.tags.is_empty() {
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(leads.tags) WHERE json_each.value IN ({}))",
                placeholders(query.tags.len())
            ));
            params.extend(query.tags.iter().cloned());
        }
        sql.push_str(" ORDER BY created_at ASC LIMIT ?");

        let mut q = sqlx::query(&sql);
        for param in params {
            q = q.bind(param);
        }
        let rows = q
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        collect_leads(&rows)
    }

    async fn update_lead(&self, id: &Uuid, update: &LeadUpdate) -> Result<(), RepositoryError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Param> = Vec::new();

        if let Some(status) = &update.status {
            sets.push("status = ?");
            params.push(Param::Text(status.clone()));
        }
        if let Some(tags) = &update.tags {
            sets.push("tags = ?");
            params.push(Param::Text(to_json(tags)?));
        }
        if let Some(score) = update.lead_score {
            sets.push("lead_score = ?");
            params.push(Param::Int(score));
        }
        if let Some(priority) = &update.priority {
            sets.push("priority = ?");
            params.push(Param::Text(priority.clone()));
        }
        if let Some(program) = &update.program_interest {
            sets.push("program_interest = ?");
            params.push(Param::Text(program.clone()));
        }
        if let Some(advisor) = update.assigned_to {
            sets.push("assigned_to = ?");
            params.push(Param::Text(advisor.to_string()));
        }
        sets.push("updated_at = ?");
        params.push(Param::Text(format_datetime(&Utc::now())));

        let sql = format!("UPDATE leads SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql);
        for param in params {
            q = match param {
                Param::Text(s) => q.bind(s),
                Param::Int(n) => q.bind(n),
            };
        }
        let result = q
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn least_loaded_advisor(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<AdvisorRouting>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT advisor_id, user_id, routing_enabled, current_weekly_assignments
               FROM advisor_routing
               WHERE user_id = ? AND routing_enabled = 1
               ORDER BY current_weekly_assignments ASC, advisor_id ASC
               LIMIT 1"#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let advisor_id: String = row.try_get("advisor_id").map_err(query_error)?;
        let owner: String = row.try_get("user_id").map_err(query_error)?;
        let routing_enabled: bool = row.try_get("routing_enabled").map_err(query_error)?;
        let weekly: i64 = row
            .try_get("current_weekly_assignments")
            .map_err(query_error)?;

        Ok(Some(AdvisorRouting {
            advisor_id: parse_uuid(&advisor_id)?,
            user_id: parse_uuid(&owner)?,
            routing_enabled,
            current_weekly_assignments: weekly.clamp(0, i64::from(u32::MAX)) as u32,
        }))
    }

    async fn record_advisor_assignment(&self, advisor_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE advisor_routing SET current_weekly_assignments = current_weekly_assignments + 1 WHERE advisor_id = ?",
        )
        .bind(advisor_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn create_task(&self, task: &Task) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO tasks
               (id, user_id, lead_id, title, description, due_date, priority, status,
                assigned_to, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.user_id.to_string())
        .bind(task.lead_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(format_datetime(&task.due_date))
        .bind(&task.priority)
        .bind(task.status.to_string())
        .bind(task.assigned_to.to_string())
        .bind(format_datetime(&task.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO notifications
               (id, user_id, title, message, kind, lead_id, read, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(notification.id.to_string())
        .bind(notification.user_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.kind)
        .bind(notification.lead_id.map(|id| id.to_string()))
        .bind(notification.read)
        .bind(format_datetime(&notification.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn log_communication(&self, entry: &CommunicationLog) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO communications
               (id, lead_id, user_id, channel, direction, subject, content, status,
                provider_message_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.lead_id.to_string())
        .bind(entry.user_id.to_string())
        .bind(entry.channel.to_string())
        .bind(&entry.direction)
        .bind(&entry.subject)
        .bind(&entry.content)
        .bind(&entry.status)
        .bind(&entry.provider_message_id)
        .bind(format_datetime(&entry.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}
