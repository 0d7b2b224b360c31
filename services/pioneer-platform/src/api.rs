//! HTTP surface for agents and operators

use crate::state::PlatformState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pioneer_core::{endpoints, PioneerError, TaskResult, WorkflowId, WorkflowStatus, VERSION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<PioneerError> for ApiError {
    fn from(err: PioneerError) -> Self {
        let status = match &err {
            PioneerError::AgentNotFound { .. }
            | PioneerError::WorkflowNotFound { .. }
            | PioneerError::KnowledgeBaseItemNotFound { .. } => StatusCode::NOT_FOUND,
            PioneerError::AgentOffline { .. }
            | PioneerError::InvalidTransition { .. }
            | PioneerError::WorkflowConflict { .. } => StatusCode::CONFLICT,
            PioneerError::EmptyDiagnosticPlan { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PioneerError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            PioneerError::ResultProcessorClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                error!(error = %err, "API error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub hostname: String,
    pub ip_address: String,
    pub os: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentResponse {
    pub agent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollQuery {
    pub agent_id: Option<String>,
    /// Shortens the server-side wait; never lengthens it.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub agent_id: String,
    pub kb_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowResponse {
    pub workflow_id: WorkflowId,
}

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

pub fn router(state: PlatformState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::METRICS, get(metrics))
        .route(endpoints::AGENT_REGISTER, post(register_agent))
        .route(endpoints::AGENT_HEARTBEAT, post(heartbeat))
        .route(endpoints::AGENT_TASKS, get(poll_task))
        .route(endpoints::AGENT_TASK_RESULTS, post(submit_result))
        .route(endpoints::API_V1_AGENTS, get(list_agents))
        .route("/api/v1/agents/{id}", get(get_agent))
        .route(
            endpoints::API_V1_WORKFLOWS,
            get(list_workflows).post(start_workflow),
        )
        .route("/api/v1/workflows/{id}", get(get_workflow))
        .with_state(state)
}

#[instrument]
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pioneer-platform",
        "version": VERSION
    }))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<PlatformState>) -> ApiResult<Json<Value>> {
    let agents = state.registry.list_agents().await?;
    let online = agents.iter().filter(|a| a.is_online()).count();

    let mut workflows: BTreeMap<&'static str, usize> =
        WorkflowStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for workflow in state.registry.list_workflows().await? {
        *workflows.entry(workflow.status.as_str()).or_default() += 1;
    }

    let queues = state.dispatcher.queues().stats();
    let results = state.results.stats();

    Ok(Json(json!({
        "service": "pioneer-platform",
        "agents": { "total": agents.len(), "online": online },
        "workflows": workflows,
        "task_queues": {
            "queues": queues.queues,
            "pending_tasks": queues.pending_tasks
        },
        "task_results": {
            "accepted": results.accepted(),
            "advanced": results.advanced(),
            "stale": results.stale(),
            "errors": results.errors()
        }
    })))
}

#[instrument(skip_all)]
async fn register_agent(
    State(state): State<PlatformState>,
    payload: Result<Json<RegisterAgentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterAgentResponse>)> {
    let Json(request) = payload?;
    require("hostname", &request.hostname)?;
    require("ip_address", &request.ip_address)?;
    require("os", &request.os)?;

    let (agent, created) = state
        .registry
        .register_agent(&request.hostname, &request.ip_address, &request.os)
        .await?;

    let (status, message) = if created {
        info!(agent_id = %agent.id, hostname = %agent.hostname, "Agent registered");
        (StatusCode::CREATED, "Agent registered successfully")
    } else {
        info!(agent_id = %agent.id, hostname = %agent.hostname, "Agent re-registered");
        (StatusCode::OK, "Agent already registered")
    };

    Ok((
        status,
        Json(RegisterAgentResponse {
            agent_id: agent.id,
            message: message.to_string(),
        }),
    ))
}

#[instrument(skip_all)]
async fn heartbeat(
    State(state): State<PlatformState>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    require("agent_id", &request.agent_id)?;

    state.registry.record_heartbeat(&request.agent_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Long-poll: 200 with the next task, or 204 once the wait elapses.
#[instrument(skip(state))]
async fn poll_task(
    State(state): State<PlatformState>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Response> {
    let agent_id = query.agent_id.unwrap_or_default();
    require("agent_id", &agent_id)?;

    let timeout = query
        .timeout_secs
        .map(Duration::from_secs)
        .map_or(state.poll_timeout, |requested| {
            requested.min(state.poll_timeout)
        });

    match state.dispatcher.next_task(&agent_id, timeout).await {
        Some(task) => Ok(Json(task).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[instrument(skip_all)]
async fn submit_result(
    State(state): State<PlatformState>,
    payload: Result<Json<TaskResult>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(result) = payload?;
    if result.task_id.is_nil() {
        return Err(ApiError::bad_request("task_id is required"));
    }
    require("agent_id", &result.agent_id)?;

    if !result.success {
        warn!(
            task_id = %result.task_id,
            agent_id = %result.agent_id,
            exit_code = result.exit_code,
            error = %result.error,
            "Agent reported failed task"
        );
    }
    state.results.enqueue(result).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

#[instrument(skip(state))]
async fn list_agents(State(state): State<PlatformState>) -> ApiResult<Json<Value>> {
    let mut agents = state.registry.list_agents().await?;
    agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(json!({
        "total": agents.len(),
        "agents": agents
    })))
}

#[instrument(skip(state))]
async fn get_agent(
    State(state): State<PlatformState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let agent = state
        .registry
        .get_agent(&agent_id)
        .await?
        .ok_or(PioneerError::AgentNotFound { agent_id })?;
    Ok(Json(json!(agent)))
}

#[instrument(skip_all)]
async fn start_workflow(
    State(state): State<PlatformState>,
    payload: Result<Json<StartWorkflowRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StartWorkflowResponse>)> {
    let Json(request) = payload?;
    require("agent_id", &request.agent_id)?;
    require("kb_id", &request.kb_id)?;

    let workflow_id = state
        .engine
        .start(&request.agent_id, &request.kb_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartWorkflowResponse { workflow_id }),
    ))
}

#[instrument(skip(state))]
async fn list_workflows(State(state): State<PlatformState>) -> ApiResult<Json<Value>> {
    let mut workflows = state.registry.list_workflows().await?;
    workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(json!({
        "total": workflows.len(),
        "workflows": workflows
    })))
}

#[instrument(skip(state))]
async fn get_workflow(
    State(state): State<PlatformState>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let not_found = || PioneerError::WorkflowNotFound {
        workflow_id: workflow_id.clone(),
    };
    let id: WorkflowId = workflow_id.parse().map_err(|_| not_found())?;
    let workflow = state
        .registry
        .get_workflow(id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!(workflow)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use pioneer_core::{
        Agent, FileKnowledgeBase, KnowledgeBaseItem, MemoryRegistry, Registry, Task, TaskKind,
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use workflow_engine::ResultProcessorHandle;

    struct Harness {
        state: PlatformState,
        registry: Arc<MemoryRegistry>,
        _processor: ResultProcessorHandle,
    }

    fn harness() -> Harness {
        let registry = Arc::new(MemoryRegistry::new());
        let kb = FileKnowledgeBase::from_items([
            KnowledgeBaseItem::new("KB1", vec!["uptime"], Some("systemctl restart app")),
            KnowledgeBaseItem::new("EMPTY", vec![], None),
        ]);
        let config = PlatformConfig::default();
        let (mut state, processor) =
            PlatformState::build(&config, registry.clone(), Arc::new(kb));
        state.poll_timeout = Duration::from_millis(50);
        Harness {
            state,
            registry,
            _processor: processor,
        }
    }

    async fn online_agent(registry: &MemoryRegistry, id: &str) {
        let mut agent = Agent::new(format!("{id}-host"), "10.0.0.2".into(), "linux".into());
        agent.id = id.to_string();
        registry.insert_agent(agent);
        registry.record_heartbeat(id).await.unwrap();
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        let response = router(h.state).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_host() {
        let h = harness();
        let body = json!({ "hostname": "web-01", "ip_address": "10.0.0.5", "os": "linux" });

        let first = router(h.state.clone())
            .oneshot(json_request("POST", endpoints::AGENT_REGISTER, body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let first_id = body_json(first).await["agent_id"].clone();

        let second = router(h.state)
            .oneshot(json_request("POST", endpoints::AGENT_REGISTER, body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["agent_id"], first_id);
    }

    #[test]
    fn test_concurrent_update_conflict_maps_to_409() {
        let err = ApiError::from(PioneerError::WorkflowConflict {
            workflow_id: "W1".into(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Workflow W1 was modified concurrently");
    }

    #[tokio::test]
    async fn test_register_rejects_missing_fields() {
        let h = harness();
        let response = router(h.state)
            .oneshot(json_request(
                "POST",
                endpoints::AGENT_REGISTER,
                json!({ "hostname": "web-01" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_agent_is_not_found() {
        let h = harness();
        let response = router(h.state)
            .oneshot(json_request(
                "POST",
                endpoints::AGENT_HEARTBEAT,
                json!({ "agent_id": "ghost" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_poll_without_agent_id_is_bad_request() {
        let h = harness();
        let response = router(h.state)
            .oneshot(get(endpoints::AGENT_TASKS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_poll_returns_no_content_when_idle() {
        let h = harness();
        let response = router(h.state)
            .oneshot(get("/api/v1/agent/tasks?agent_id=A1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_poll_returns_queued_task() {
        let h = harness();
        let task = Task::new(
            uuid::Uuid::new_v4(),
            "A1".into(),
            TaskKind::Diagnostic,
            "df -h",
        );
        h.state.dispatcher.queues().submit(task.clone()).await.unwrap();

        let response = router(h.state)
            .oneshot(get("/api/v1/agent/tasks?agent_id=A1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let polled: Task = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(polled, task);
    }

    #[tokio::test]
    async fn test_start_workflow_error_mapping() {
        let h = harness();
        online_agent(&h.registry, "A1").await;
        let mut offline = Agent::new("db-02".into(), "10.0.0.3".into(), "linux".into());
        offline.id = "A2".to_string();
        h.registry.insert_agent(offline);

        let cases = [
            (json!({ "agent_id": "A2", "kb_id": "KB1" }), StatusCode::CONFLICT),
            (json!({ "agent_id": "nobody", "kb_id": "KB1" }), StatusCode::NOT_FOUND),
            (json!({ "agent_id": "A1", "kb_id": "KB404" }), StatusCode::NOT_FOUND),
            (json!({ "agent_id": "A1", "kb_id": "EMPTY" }), StatusCode::UNPROCESSABLE_ENTITY),
            (json!({ "agent_id": "A1" }), StatusCode::BAD_REQUEST),
        ];
        for (body, expected) in cases {
            let response = router(h.state.clone())
                .oneshot(json_request("POST", endpoints::API_V1_WORKFLOWS, body.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "request {body}");
        }
        assert_eq!(h.state.dispatcher.queues().depth("A1"), 0);
    }

    #[tokio::test]
    async fn test_start_then_fetch_workflow() {
        let h = harness();
        online_agent(&h.registry, "A1").await;

        let response = router(h.state.clone())
            .oneshot(json_request(
                "POST",
                endpoints::API_V1_WORKFLOWS,
                json!({ "agent_id": "A1", "kb_id": "KB1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let workflow_id = body_json(response).await["workflow_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router(h.state.clone())
            .oneshot(get(&format!("/api/v1/workflows/{workflow_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let workflow = body_json(response).await;
        assert_eq!(workflow["status"], "diagnosing");
        assert_eq!(workflow["kb_id"], "KB1");
        assert_eq!(h.state.dispatcher.queues().depth("A1"), 1);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let h = harness();
        for uri in [
            "/api/v1/workflows/not-a-uuid",
            "/api/v1/workflows/00000000-0000-0000-0000-000000000000",
        ] {
            let response = router(h.state.clone()).oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_result_is_accepted() {
        let h = harness();
        let result = TaskResult::succeeded(uuid::Uuid::new_v4(), "A1".into(), "ok".into());
        let response = router(h.state)
            .oneshot(json_request(
                "POST",
                endpoints::AGENT_TASK_RESULTS,
                serde_json::to_value(result).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_malformed_result_is_bad_request() {
        let h = harness();
        let bodies = [
            json!({ "task_id": "nope", "agent_id": "A1", "success": true }),
            json!({ "task_id": uuid::Uuid::nil(), "agent_id": "A1", "success": true }),
            json!({ "task_id": uuid::Uuid::new_v4(), "agent_id": "", "success": true }),
        ];
        for body in bodies {
            let response = router(h.state.clone())
                .oneshot(json_request("POST", endpoints::AGENT_TASK_RESULTS, body.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "request {body}");
        }
        assert_eq!(h.state.results.stats().accepted(), 0);
    }

    #[tokio::test]
    async fn test_get_agent() {
        let h = harness();
        online_agent(&h.registry, "A1").await;

        let response = router(h.state.clone())
            .oneshot(get("/api/v1/agents/A1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "online");

        let response = router(h.state).oneshot(get("/api/v1/agents/A9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
