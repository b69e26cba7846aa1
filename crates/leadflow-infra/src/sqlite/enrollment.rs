//! SQLite enrollment repository implementation.
//!
//! Enrollments keep their step history and metadata as JSON columns. Step
//! executions are append-only rows.

use chrono::{DateTime, Utc};
use leadflow_core::repository::enrollment::EnrollmentRepository;
use leadflow_types::enrollment::{Enrollment, EnrollmentStatus, StepExecution, StepExecutionStatus};
use leadflow_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, query_error, to_json};

/// SQLite-backed implementation of `EnrollmentRepository`.
pub struct SqliteEnrollmentRepository {
    pool: DatabasePool,
}

impl SqliteEnrollmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const ENROLLMENT_COLUMNS: &str = "id, workflow_id, lead_id, user_id, current_step_index, status, \
     step_history, metadata, next_step_scheduled_at, enrolled_at, completed_at, exit_reason";

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct EnrollmentRow {
    id: String,
    workflow_id: String,
    lead_id: String,
    user_id: String,
    current_step_index: i64,
    status: String,
    step_history: String,
    metadata: String,
    next_step_scheduled_at: Option<String>,
    enrolled_at: String,
    completed_at: Option<String>,
    exit_reason: Option<String>,
}

impl EnrollmentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            lead_id: row.try_get("lead_id")?,
            user_id: row.try_get("user_id")?,
            current_step_index: row.try_get("current_step_index")?,
            status: row.try_get("status")?,
            step_history: row.try_get("step_history")?,
            metadata: row.try_get("metadata")?,
            next_step_scheduled_at: row.try_get("next_step_scheduled_at")?,
            enrolled_at: row.try_get("enrolled_at")?,
            completed_at: row.try_get("completed_at")?,
            exit_reason: row.try_get("exit_reason")?,
        })
    }

    fn into_enrollment(self) -> Result<Enrollment, RepositoryError> {
        let status: EnrollmentStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;

        Ok(Enrollment {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            lead_id: parse_uuid(&self.lead_id)?,
            user_id: parse_uuid(&self.user_id)?,
            current_step_index: self.current_step_index.max(0) as usize,
            status,
            step_history: parse_json(&self.step_history, "step_history")?,
            metadata: parse_json(&self.metadata, "metadata")?,
            next_step_scheduled_at: self
                .next_step_scheduled_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            enrolled_at: parse_datetime(&self.enrolled_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            exit_reason: self.exit_reason,
        })
    }
}

struct StepExecutionRow {
    id: String,
    enrollment_id: String,
    step_index: i64,
    step_type: String,
    step_config: String,
    status: String,
    started_at: String,
    completed_at: String,
    result: Option<String>,
    error_message: Option<String>,
}

impl StepExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            enrollment_id: row.try_get("enrollment_id")?,
            step_index: row.try_get("step_index")?,
            step_type: row.try_get("step_type")?,
            step_config: row.try_get("step_config")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn into_execution(self) -> Result<StepExecution, RepositoryError> {
        let status = match self.status.as_str() {
            "completed" => StepExecutionStatus::Completed,
            "failed" => StepExecutionStatus::Failed,
            other => {
                return Err(RepositoryError::Query(format!("invalid step status: {other}")));
            }
        };

        Ok(StepExecution {
            id: parse_uuid(&self.id)?,
            enrollment_id: parse_uuid(&self.enrollment_id)?,
            step_index: self.step_index.max(0) as usize,
            step_type: self.step_type,
            step_config: parse_json(&self.step_config, "step_config")?,
            status,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: parse_datetime(&self.completed_at)?,
            result: self
                .result
                .as_deref()
                .map(|s| parse_json(s, "result"))
                .transpose()?,
            error_message: self.error_message,
        })
    }
}

fn collect_enrollments(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Enrollment>, RepositoryError> {
    rows.iter()
        .map(|row| {
            EnrollmentRow::from_row(row)
                .map_err(query_error)?
                .into_enrollment()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// EnrollmentRepository impl
// ---------------------------------------------------------------------------

impl EnrollmentRepository for SqliteEnrollmentRepository {
    async fn create_enrollment(
        &self,
        enrollment: &Enrollment,
        allow_existing: bool,
    ) -> Result<bool, RepositoryError> {
        // One statement, so the existence check cannot interleave with
        // another writer.
        let result = sqlx::query(
            r#"INSERT INTO workflow_enrollments
               (id, workflow_id, lead_id, user_id, current_step_index, status, step_history,
                metadata, next_step_scheduled_at, enrolled_at, completed_at, exit_reason)
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE ? OR NOT EXISTS (
                 SELECT 1 FROM workflow_enrollments WHERE workflow_id = ? AND lead_id = ?
               )"#,
        )
        .bind(enrollment.id.to_string())
        .bind(enrollment.workflow_id.to_string())
        .bind(enrollment.lead_id.to_string())
        .bind(enrollment.user_id.to_string())
        .bind(enrollment.current_step_index as i64)
        .bind(enrollment.status.to_string())
        .bind(to_json(&enrollment.step_history)?)
        .bind(to_json(&enrollment.metadata)?)
        .bind(enrollment.next_step_scheduled_at.as_ref().map(format_datetime))
        .bind(format_datetime(&enrollment.enrolled_at))
        .bind(enrollment.completed_at.as_ref().map(format_datetime))
        .bind(&enrollment.exit_reason)
        .bind(allow_existing)
        .bind(enrollment.workflow_id.to_string())
        .bind(enrollment.lead_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_enrollment(&self, id: &Uuid) -> Result<Option<Enrollment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM workflow_enrollments WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = EnrollmentRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_enrollment()?))
            }
            None => Ok(None),
        }
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_enrollments SET
                 current_step_index = ?,
                 status = ?,
                 step_history = ?,
                 next_step_scheduled_at = ?,
                 completed_at = ?,
                 exit_reason = ?
               WHERE id = ?"#,
        )
        .bind(enrollment.current_step_index as i64)
        .bind(enrollment.status.to_string())
        .bind(to_json(&enrollment.step_history)?)
        .bind(enrollment.next_step_scheduled_at.as_ref().map(format_datetime))
        .bind(enrollment.completed_at.as_ref().map(format_datetime))
        .bind(&enrollment.exit_reason)
        .bind(enrollment.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_enrollments(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM workflow_enrollments
             WHERE workflow_id = ? ORDER BY enrolled_at DESC, id DESC LIMIT ?"
        ))
        .bind(workflow_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        collect_enrollments(&rows)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM workflow_enrollments
             WHERE status = 'active'
               AND (next_step_scheduled_at IS NULL OR next_step_scheduled_at <= ?)
             ORDER BY next_step_scheduled_at ASC, enrolled_at ASC
             LIMIT ?"
        ))
        .bind(format_datetime(&now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        collect_enrollments(&rows)
    }

    async fn record_step_execution(&self, execution: &StepExecution) -> Result<(), RepositoryError> {
        let result = execution.result.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_step_executions
               (id, enrollment_id, step_index, step_type, step_config, status,
                started_at, completed_at, result, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.enrollment_id.to_string())
        .bind(execution.step_index as i64)
        .bind(&execution.step_type)
        .bind(to_json(&execution.step_config)?)
        .bind(execution.status.to_string())
        .bind(format_datetime(&execution.started_at))
        .bind(format_datetime(&execution.completed_at))
        .bind(&result)
        .bind(&execution.error_message)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn list_step_executions(
        &self,
        enrollment_id: &Uuid,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_step_executions WHERE enrollment_id = ? ORDER BY started_at ASC, id ASC",
        )
        .bind(enrollment_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                StepExecutionRow::from_row(row)
                    .map_err(query_error)?
                    .into_execution()
            })
            .collect()
    }
}
