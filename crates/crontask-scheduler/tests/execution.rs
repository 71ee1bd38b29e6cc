mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{stack, stalled_body_url, task, unreachable_url, MockServer};
use crontask_scheduler::{HttpMethod, LogStatus, LogStore, SchedulerError, TaskDefinition, TaskStatus};

fn paused(def: TaskDefinition) -> TaskDefinition {
    TaskDefinition {
        status: TaskStatus::Paused,
        ..def
    }
}

#[tokio::test]
async fn ok_response_logs_success() {
    let server = MockServer::start().await;
    let s = stack(Duration::from_secs(5));
    let id = s
        .service
        .create_task(paused(task("ok", server.url("/ok"), "0 0 * * *")))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert!(result.success);
    assert_eq!(result.status, Some(200));
    assert_eq!(result.data.as_deref(), Some("pong"));

    let page = s.logs.query(Some(id), 1, 10).unwrap();
    assert_eq!(page.total, 1);
    let entry = &page.logs[0];
    assert_eq!(entry.status, LogStatus::Success);
    assert_eq!(entry.response_status, Some(200));
    assert_eq!(entry.response_body.as_deref(), Some("pong"));
    assert!(entry.error_message.is_none());
    assert_eq!(entry.task_name.as_deref(), Some("ok"));
}

#[tokio::test]
async fn server_error_is_a_response_not_a_transport_failure() {
    let server = MockServer::start().await;
    let s = stack(Duration::from_secs(5));
    let id = s
        .service
        .create_task(paused(task("fail", server.url("/fail"), "0 0 * * *")))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status, Some(500));
    assert!(result.error.is_none());

    let entry = &s.logs.query(Some(id), 1, 10).unwrap().logs[0];
    assert_eq!(entry.status, LogStatus::Error);
    assert_eq!(entry.response_status, Some(500));
    assert_eq!(entry.response_body.as_deref(), Some("boom"));
    assert!(entry.error_message.is_none());
}

#[tokio::test]
async fn unreachable_target_logs_transport_error() {
    let s = stack(Duration::from_secs(5));
    let id = s
        .service
        .create_task(paused(task("down", unreachable_url(), "0 0 * * *")))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert!(!result.success);
    assert!(result.status.is_none());
    assert!(result.error.is_some());

    let entry = &s.logs.query(Some(id), 1, 10).unwrap().logs[0];
    assert_eq!(entry.status, LogStatus::Error);
    assert!(entry.response_status.is_none());
    assert!(entry.error_message.is_some());
}

#[tokio::test]
async fn slow_target_times_out() {
    let server = MockServer::start().await;
    let s = stack(Duration::from_millis(300));
    let id = s
        .service
        .create_task(paused(task("slow", server.url("/slow"), "0 0 * * *")))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert!(!result.success);
    assert!(result.status.is_none());
    assert_eq!(
        result.error.as_deref(),
        Some("request timed out after 300ms")
    );
    assert!(result.execution_time >= 300);
    assert!(result.execution_time < 5000);
}

#[tokio::test]
async fn stalled_body_is_a_transport_timeout() {
    let url = stalled_body_url().await;
    let s = stack(Duration::from_millis(300));
    let id = s
        .service
        .create_task(paused(task("stall", url, "0 0 * * *")))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert!(!result.success);
    assert!(result.status.is_none());
    assert!(result.data.is_none());
    assert_eq!(
        result.error.as_deref(),
        Some("request timed out after 300ms")
    );
    assert!(result.execution_time < 5000);

    let entry = &s.logs.query(Some(id), 1, 10).unwrap().logs[0];
    assert_eq!(entry.status, LogStatus::Error);
    assert!(entry.response_status.is_none());
    assert!(entry.response_body.is_none());
    assert_eq!(
        entry.error_message.as_deref(),
        Some("request timed out after 300ms")
    );
}

#[tokio::test]
async fn headers_and_body_are_forwarded_verbatim() {
    let server = MockServer::start().await;
    let s = stack(Duration::from_secs(5));
    let id = s
        .service
        .create_task(paused(TaskDefinition {
            method: HttpMethod::Post,
            headers: BTreeMap::from([("x-token".to_string(), "secret".to_string())]),
            body: Some("raw payload".to_string()),
            ..task("echo", server.url("/echo"), "0 0 * * *")
        }))
        .unwrap();

    let result = s.service.test_now(id).await.unwrap();
    assert_eq!(result.data.as_deref(), Some("POST|secret|-|raw payload"));
}

#[tokio::test]
async fn delete_of_missing_task_is_not_found() {
    let s = stack(Duration::from_secs(5));
    let err = s.service.delete_task(404).unwrap_err();
    assert!(matches!(err, SchedulerError::TaskNotFound { id: 404 }));
    assert!(s.service.list_tasks().unwrap().is_empty());
    assert!(s.service.running_task_ids().is_empty());
}
