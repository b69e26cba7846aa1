//! POST /scheduler/tick: advance every due enrollment once.

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use leadflow_types::execution::TickSummary;

use crate::http::error::AppError;
use crate::state::AppState;

pub async fn tick(State(state): State<AppState>) -> Result<Json<TickSummary>, AppError> {
    let summary = state.scheduler.tick(Utc::now()).await?;
    Ok(Json(summary))
}
