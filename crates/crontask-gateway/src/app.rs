use axum::{
    routing::{get, post, put},
    Router,
};
use crontask_core::config::CrontaskConfig;
use crontask_scheduler::{
    db::SharedConnection, CronClock, HttpExecutor, SqliteLogStore, SqliteTaskStore, TaskRegistry,
    TaskRunner, TaskService,
};
use std::sync::Arc;

use crate::http::{health, logs, tasks};

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub service: TaskService,
}

impl AppState {
    pub fn new(service: TaskService) -> Self {
        Self { service }
    }
}

/// Wire stores, clock, executor and registry over one SQLite connection.
pub fn build_service(
    config: &CrontaskConfig,
    conn: SharedConnection,
) -> crontask_scheduler::Result<TaskService> {
    let store = Arc::new(SqliteTaskStore::new(conn.clone()));
    let logs = Arc::new(SqliteLogStore::new(conn, config.logs.max_page_size));
    let executor = HttpExecutor::new(&config.executor)?;
    let runner = Arc::new(TaskRunner::new(executor, logs.clone()));
    let registry = Arc::new(TaskRegistry::new(Arc::new(CronClock::new()), runner));
    Ok(TaskService::new(
        store,
        logs,
        registry,
        config.logs.default_page_size,
    ))
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/running", get(tasks::running_tasks))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/status", put(tasks::set_status))
        .route("/api/tasks/{id}/actions", post(tasks::perform_action))
        .route("/api/tasks/{id}/test", post(tasks::test_task))
        .route("/api/logs", get(logs::list_logs))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
