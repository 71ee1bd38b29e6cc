#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Router,
};
use crontask_core::config::ExecutorConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use crontask_scheduler::{
    db, CronClock, HttpExecutor, HttpMethod, LogStore, SqliteLogStore, SqliteTaskStore,
    TaskDefinition, TaskRegistry, TaskRunner, TaskService, TaskStatus,
};

/// Local HTTP target with fixed behaviours per path.
pub struct MockServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/ok", any(ok))
            .route("/fail", any(fail))
            .route("/slow", get(slow))
            .route("/echo", any(echo))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn ok(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    "pong"
}

async fn fail(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn slow(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> String {
    let token = headers
        .get("x-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    format!("{method}|{token}|{content_type}|{body}")
}

/// A target that sends a 200 with a `Content-Length` it never fulfils,
/// then holds the connection open.
pub async fn stalled_body_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nab")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }
    });
    format!("http://{addr}/")
}

/// A URL nothing is listening on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

pub struct Stack {
    pub service: TaskService,
    pub logs: Arc<SqliteLogStore>,
}

/// Full production wiring over an in-memory database.
pub fn stack(timeout: Duration) -> Stack {
    let conn = db::open_in_memory().unwrap();
    let store = Arc::new(SqliteTaskStore::new(conn.clone()));
    let logs = Arc::new(SqliteLogStore::new(conn, 500));
    let executor = HttpExecutor::with_timeout(&ExecutorConfig::default(), timeout).unwrap();
    let runner = Arc::new(TaskRunner::new(executor, logs.clone()));
    let registry = Arc::new(TaskRegistry::new(Arc::new(CronClock::new()), runner));
    Stack {
        service: TaskService::new(store, logs.clone(), registry, 50),
        logs,
    }
}

pub fn task(name: &str, url: String, cron: &str) -> TaskDefinition {
    TaskDefinition {
        name: name.to_string(),
        url,
        method: HttpMethod::Get,
        headers: Default::default(),
        body: None,
        cron_expression: cron.to_string(),
        status: TaskStatus::Active,
    }
}

pub fn log_count(logs: &SqliteLogStore, task_id: i64) -> u64 {
    logs.query(Some(task_id), 1, 1).unwrap().total
}
