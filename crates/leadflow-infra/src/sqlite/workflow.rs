//! SQLite workflow repository implementation.
//!
//! Definitions are stored as their builder wire-format JSON. Execution
//! statistics live in dedicated columns so runs can fold their counters in
//! with a single additive `UPDATE`; the `execution_stats` of a loaded
//! definition always reflects those columns.

use chrono::{DateTime, Utc};
use leadflow_core::repository::workflow::WorkflowRepository;
use leadflow_types::error::RepositoryError;
use leadflow_types::workflow::{ExecutionStats, StatsDelta, WorkflowDefinition};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const WORKFLOW_COLUMNS: &str =
    "definition, total_enrolled, active, completed, exited, last_executed_at";

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    definition: String,
    total_enrolled: i64,
    active: i64,
    completed: i64,
    exited: i64,
    last_executed_at: Option<String>,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
            total_enrolled: row.try_get("total_enrolled")?,
            active: row.try_get("active")?,
            completed: row.try_get("completed")?,
            exited: row.try_get("exited")?,
            last_executed_at: row.try_get("last_executed_at")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        let mut def: WorkflowDefinition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))?;
        def.execution_stats = ExecutionStats {
            total_enrolled: self.total_enrolled.max(0) as u64,
            active: self.active.max(0) as u64,
            completed: self.completed.max(0) as u64,
            exited: self.exited.max(0) as u64,
            last_executed_at: self
                .last_executed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        };
        Ok(def)
    }
}

fn status_str(def: &WorkflowDefinition) -> Result<String, RepositoryError> {
    Ok(serde_json::to_value(def.status)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .as_str()
        .unwrap_or("draft")
        .to_string())
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    /// Insert or replace a definition. Stats are taken from the definition
    /// only on first insert; afterwards the engine owns them.
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let definition_json = to_json(def)?;
        let stats = &def.execution_stats;

        sqlx::query(
            r#"INSERT INTO workflows
               (id, user_id, name, status, definition, total_enrolled, active, completed,
                exited, last_executed_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 name = excluded.name,
                 status = excluded.status,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(def.id.to_string())
        .bind(def.user_id.to_string())
        .bind(&def.name)
        .bind(status_str(def)?)
        .bind(&definition_json)
        .bind(stats.total_enrolled as i64)
        .bind(stats.active as i64)
        .bind(stats.completed as i64)
        .bind(stats.exited as i64)
        .bind(stats.last_executed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&def.created_at))
        .bind(format_datetime(&def.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_definition()?))
            }
            None => Ok(None),
        }
    }

    async fn list_definitions(
        &self,
        user_id: Option<&Uuid>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE user_id = ? ORDER BY name ASC"
                ))
                .bind(user_id.to_string())
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows ORDER BY name ASC"
                ))
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_error)?;

        let mut defs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowRow::from_row(row).map_err(query_error)?;
            defs.push(r.into_definition()?);
        }
        Ok(defs)
    }

    async fn record_execution(
        &self,
        workflow_id: &Uuid,
        delta: &StatsDelta,
        executed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let enrolled = delta.enrolled as i64;
        let completed = delta.completed as i64;
        let exited = delta.exited as i64;

        let result = sqlx::query(
            r#"UPDATE workflows SET
                 total_enrolled = total_enrolled + ?,
                 active = MAX(active + ? - ? - ?, 0),
                 completed = completed + ?,
                 exited = exited + ?,
                 last_executed_at = ?
               WHERE id = ?"#,
        )
        .bind(enrolled)
        .bind(enrolled)
        .bind(completed)
        .bind(exited)
        .bind(completed)
        .bind(exited)
        .bind(format_datetime(&executed_at))
        .bind(workflow_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;
    use leadflow_types::workflow::StepConfig;
    use serde_json::json;

    fn definition(user_id: Uuid, name: &str) -> WorkflowDefinition {
        let json = json!({
            "id": Uuid::now_v7(),
            "user_id": user_id,
            "name": name,
            "status": "active",
            "steps": [
                { "type": "trigger", "config": { "triggerType": "manual" } },
                { "type": "email", "config": { "subject": "Hi", "content": "Welcome" } },
            ],
        });
        WorkflowDefinition::from_json(&json.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_definition() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = definition(Uuid::now_v7(), "Welcome");
        repo.save_definition(&def).await.unwrap();

        let loaded = repo.get_definition(&def.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Welcome");
        assert_eq!(loaded.steps.len(), 2);
        assert!(matches!(loaded.steps[1].config, StepConfig::Email(_)));
        assert!(repo.get_definition(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_definitions_filters_by_owner() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let owner = Uuid::now_v7();
        repo.save_definition(&definition(owner, "B")).await.unwrap();
        repo.save_definition(&definition(owner, "A")).await.unwrap();
        repo.save_definition(&definition(Uuid::now_v7(), "C")).await.unwrap();

        let mine = repo.list_definitions(Some(&owner)).await.unwrap();
        let names: Vec<&str> = mine.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(repo.list_definitions(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_record_execution_is_additive() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = definition(Uuid::now_v7(), "Stats");
        repo.save_definition(&def).await.unwrap();

        let now = Utc::now();
        let first = StatsDelta {
            enrolled: 3,
            completed: 1,
            exited: 0,
        };
        let second = StatsDelta {
            enrolled: 2,
            completed: 0,
            exited: 1,
        };
        repo.record_execution(&def.id, &first, now).await.unwrap();
        repo.record_execution(&def.id, &second, now).await.unwrap();

        // Re-saving the definition must not reset engine-owned stats.
        repo.save_definition(&def).await.unwrap();

        let stats = repo.get_definition(&def.id).await.unwrap().unwrap().execution_stats;
        assert_eq!(stats.total_enrolled, 5);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.exited, 1);
        assert!(stats.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn test_record_execution_unknown_workflow() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let err = repo
            .record_execution(&Uuid::now_v7(), &StatsDelta::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
