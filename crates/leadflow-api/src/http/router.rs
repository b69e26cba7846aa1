//! Axum router configuration with middleware.
//!
//! The execute endpoint is mounted both at `/execute-workflow` and under
//! `/functions/v1/` so existing callers keep working. Middleware: CORS and
//! request tracing.

use axum::Router;
use axum::http::{HeaderName, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ]);

    Router::new()
        .route("/execute-workflow", post(handlers::execute::execute_workflow))
        .route(
            "/functions/v1/execute-workflow",
            post(handlers::execute::execute_workflow),
        )
        .route("/scheduler/tick", post(handlers::scheduler::tick))
        .route(
            "/workflows/{id}/enrollments",
            get(handlers::enrollment::list_enrollments),
        )
        .route(
            "/enrollments/{id}/executions",
            get(handlers::enrollment::list_executions),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
