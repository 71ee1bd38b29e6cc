//! Task management endpoints under `/api/tasks`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use crontask_scheduler::{ActionOutcome, ExecutionResult, Task, TaskDefinition, TaskPatch, TaskStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::http::error::{api_error, bad_request, ApiError};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
}

/// Build a definition from a create body. Missing required fields become empty
/// strings so validation can report all of them at once.
fn definition_from(body: TaskPatch) -> TaskDefinition {
    TaskDefinition {
        name: body.name.unwrap_or_default(),
        url: body.url.unwrap_or_default(),
        method: body.method.unwrap_or_default(),
        headers: body.headers.unwrap_or_default(),
        body: body.body.filter(|b| !b.is_empty()),
        cron_expression: body.cron_expression.unwrap_or_default(),
        status: body.status.unwrap_or(TaskStatus::Active),
    }
}

/// GET /api/tasks: every task, newest first.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    state.service.list_tasks().map(Json).map_err(api_error)
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(bad_request)?;
    let def = definition_from(body);
    let active = def.status == TaskStatus::Active;
    let id = state.service.create_task(def).map_err(api_error)?;
    let message = if active {
        "Task created and started successfully"
    } else {
        "Task created successfully"
    };
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "message": message }))))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    state.service.get_task(id).map(Json).map_err(api_error)
}

/// PUT /api/tasks/{id}: partial update; omitted fields keep their values.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = body.map_err(bad_request)?;
    let task = state.service.update_task(id, patch).map_err(api_error)?;
    Ok(Json(json!({
        "message": "Task updated successfully",
        "id": id,
        "task": task,
    })))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.service.delete_task(id).map_err(api_error)?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

/// PUT /api/tasks/{id}/status: body `{"status": "active" | "paused"}`.
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.map_err(bad_request)?;
    let status = state.service.set_status(id, &req.status).map_err(api_error)?;
    let verb = match status {
        TaskStatus::Active => "activated",
        TaskStatus::Paused => "paused",
    };
    Ok(Json(json!({
        "message": format!("Task {verb} successfully"),
        "status": status,
    })))
}

/// POST /api/tasks/{id}/actions: body `{"action": "pause" | "resume" | "test"}`.
pub async fn perform_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.map_err(bad_request)?;
    let outcome = state
        .service
        .perform_action(id, &req.action)
        .await
        .map_err(api_error)?;
    let body = match outcome {
        ActionOutcome::StatusChanged { status } => {
            let verb = match status {
                TaskStatus::Active => "resumed",
                TaskStatus::Paused => "paused",
            };
            json!({ "message": format!("Task {verb} successfully"), "status": status })
        }
        ActionOutcome::Tested(result) => json!(result),
    };
    Ok(Json(body))
}

/// POST /api/tasks/{id}/test: run once now and return the outcome.
pub async fn test_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ExecutionResult>, ApiError> {
    state.service.test_now(id).await.map(Json).map_err(api_error)
}

/// GET /api/tasks/running: ids holding a live timer.
pub async fn running_tasks(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "running": state.service.running_task_ids() }))
}
