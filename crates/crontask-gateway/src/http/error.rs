use axum::{http::StatusCode, Json};
use crontask_scheduler::SchedulerError;
use serde_json::{json, Value};
use tracing::error;

/// Error half of every handler's return type.
pub type ApiError = (StatusCode, Json<Value>);

/// Map a scheduler error onto a status code and `{"error", "code"}` body.
pub fn api_error(err: SchedulerError) -> ApiError {
    let status = match &err {
        SchedulerError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    (
        status,
        Json(json!({ "error": err.to_string(), "code": err.code() })),
    )
}

/// 400 for request bodies or query strings that could not be decoded.
pub fn bad_request(message: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.to_string(), "code": "VALIDATION_ERROR" })),
    )
}
