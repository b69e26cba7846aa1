//! Read-only enrollment inspection.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use leadflow_core::repository::enrollment::EnrollmentRepository;
use leadflow_types::enrollment::{Enrollment, StepExecution};

use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// GET /workflows/{id}/enrollments
pub async fn list_enrollments(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let enrollments = state
        .enrollments
        .list_enrollments(&workflow_id, query.limit)
        .await?;
    Ok(Json(enrollments))
}

/// GET /enrollments/{id}/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<Vec<StepExecution>>, AppError> {
    if state.enrollments.get_enrollment(&enrollment_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "enrollment not found: {enrollment_id}"
        )));
    }

    let executions = state
        .enrollments
        .list_step_executions(&enrollment_id)
        .await?;
    Ok(Json(executions))
}
