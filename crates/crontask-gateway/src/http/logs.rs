use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use crontask_scheduler::LogPage;
use serde::Deserialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::http::error::{api_error, bad_request, ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(rename = "taskId")]
    pub task_id: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /api/logs?taskId=&page=&limit=
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogPage>, ApiError> {
    let Query(query) = query.map_err(bad_request)?;
    let page = state
        .service
        .query_logs(query.task_id, query.page, query.limit)
        .map_err(api_error)?;
    Ok(Json(page))
}
