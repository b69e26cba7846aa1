//! POST /execute-workflow
//!
//! Enrolls the requested (or audience-selected) leads and executes their
//! current step. Responds with the per-lead [`ExecutionResult`].

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use leadflow_types::execution::{ExecutionRequest, ExecutionResult};

use crate::http::error::AppError;
use crate::state::AppState;

pub async fn execute_workflow(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, AppError> {
    let Json(request) = payload?;

    let result = state.runner.execute(&request).await?;
    tracing::info!(
        workflow_id = %request.workflow_id,
        total = result.total,
        enrolled = result.enrolled,
        skipped = result.skipped,
        failed = result.failed,
        "execute-workflow completed"
    );

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use leadflow_core::repository::enrollment::EnrollmentRepository;
    use leadflow_core::repository::workflow::WorkflowRepository;
    use leadflow_types::lead::Lead;
    use leadflow_types::workflow::WorkflowDefinition;

    use crate::http::router::build_router;
    use crate::state::AppState;
    use crate::state::test_support::test_state;

    async fn seed(state: &AppState, steps: Value) -> (WorkflowDefinition, Lead) {
        let user_id = Uuid::now_v7();
        let definition = WorkflowDefinition::from_json(
            &json!({
                "id": Uuid::now_v7(),
                "userId": user_id,
                "name": "Welcome sequence",
                "status": "active",
                "steps": steps,
            })
            .to_string(),
        )
        .unwrap();
        state.workflows.save_definition(&definition).await.unwrap();

        let mut lead = Lead::new(Uuid::now_v7(), user_id);
        lead.first_name = Some("Ana".to_string());
        lead.email = Some("ana@example.com".to_string());
        lead.status = Some("new".to_string());
        state.crm.upsert_lead(&lead).await.unwrap();

        (definition, lead)
    }

    fn email_steps() -> Value {
        json!([
            { "type": "trigger", "config": { "triggerType": "manual" } },
            { "type": "email", "config": { "subject": "Hi {{firstName}}", "content": "<p>Welcome</p>" } },
        ])
    }

    async fn post(state: AppState, uri: &str, body: String) -> (StatusCode, Value) {
        let response = build_router(state)
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_execute_in_test_mode_enrolls_without_providers() {
        let state = test_state().await;
        let (definition, lead) = seed(&state, email_steps()).await;

        let body = json!({
            "workflowId": definition.id,
            "leadIds": [lead.id],
            "testMode": true,
            "userId": definition.user_id,
        });
        let (status, value) = post(state.clone(), "/execute-workflow", body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["total"], 1);
        assert_eq!(value["enrolled"], 1);
        assert_eq!(value["details"][0]["status"], "enrolled");

        let enrollments = state.enrollments.list_enrollments(&definition.id, 10).await.unwrap();
        assert_eq!(enrollments.len(), 1);
        let executions = state
            .enrollments
            .list_step_executions(&enrollments[0].id)
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].step_type, "email");
        assert_eq!(executions[0].result.as_ref().unwrap()["test_mode"], true);
    }

    #[tokio::test]
    async fn test_functions_path_alias() {
        let state = test_state().await;
        let (definition, lead) = seed(&state, email_steps()).await;

        let body = json!({
            "workflowId": definition.id,
            "leadIds": [lead.id],
            "testMode": true,
            "userId": definition.user_id,
        });
        let (status, value) =
            post(state, "/functions/v1/execute-workflow", body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["enrolled"], 1);
    }

    #[tokio::test]
    async fn test_missing_email_credentials_is_500() {
        let state = test_state().await;
        let (definition, lead) = seed(&state, email_steps()).await;

        let body = json!({
            "workflowId": definition.id,
            "leadIds": [lead.id],
            "userId": definition.user_id,
        });
        let (status, value) = post(state, "/execute-workflow", body.to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].as_str().unwrap().contains("RESEND_API_KEY"));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_500() {
        let state = test_state().await;
        let body = json!({ "workflowId": Uuid::now_v7(), "userId": Uuid::now_v7() });
        let (status, value) = post(state, "/execute-workflow", body.to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].as_str().unwrap().contains("workflow not found"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let state = test_state().await;
        let (status, value) = post(state, "/execute-workflow", "{not json".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_preflight_allows_any_origin() {
        let state = test_state().await;
        let response = build_router(state)
            .oneshot(
                Request::options("/execute-workflow")
                    .header("origin", "https://crm.example.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "authorization,apikey")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
        let allowed = response.headers()["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .to_string();
        assert!(allowed.contains("apikey"));
        assert!(allowed.contains("x-client-info"));
    }
}
