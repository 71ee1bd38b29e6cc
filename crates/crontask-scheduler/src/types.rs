use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Desired scheduling state of a task, as persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The registry holds exactly one live timer for the task.
    Active,
    /// The registry holds no timer for the task.
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(format!(
                "invalid status '{other}': must be \"active\" or \"paused\""
            )),
        }
    }
}

/// HTTP verb used when a task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// Everything about a task that a caller controls. Has no id until persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Forwarded verbatim; never interpreted by the scheduler.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw request payload, forwarded verbatim.
    #[serde(default)]
    pub body: Option<String>,
    /// 5-field (`min hour dom mon dow`) or 6-field (`sec min hour dom mon dow`).
    pub cron_expression: String,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
}

fn default_status() -> TaskStatus {
    TaskStatus::Active
}

impl TaskDefinition {
    /// Check the fields that do not need the clock source.
    ///
    /// Cron grammar is validated separately by [`crate::clock::ClockSource::validate`].
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.url.trim().is_empty() {
            missing.push("url");
        }
        if self.cron_expression.trim().is_empty() {
            missing.push("cron_expression");
        }
        if !missing.is_empty() {
            return Err(SchedulerError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let parsed = reqwest::Url::parse(self.url.trim())
            .map_err(|e| SchedulerError::Validation(format!("invalid url '{}': {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SchedulerError::Validation(format!(
                "invalid url '{}': scheme must be http or https",
                self.url
            )));
        }
        Ok(())
    }

    /// Merge a partial update over this definition. Unset patch fields keep
    /// their current value.
    pub fn apply(&self, patch: &TaskPatch) -> TaskDefinition {
        TaskDefinition {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            url: patch.url.clone().unwrap_or_else(|| self.url.clone()),
            method: patch.method.unwrap_or(self.method),
            headers: patch
                .headers
                .clone()
                .unwrap_or_else(|| self.headers.clone()),
            body: match &patch.body {
                Some(body) if body.is_empty() => None,
                Some(body) => Some(body.clone()),
                None => self.body.clone(),
            },
            cron_expression: patch
                .cron_expression
                .clone()
                .unwrap_or_else(|| self.cron_expression.clone()),
            status: patch.status.unwrap_or(self.status),
        }
    }
}

/// Partial update: only the fields that are `Some` change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    /// `Some("")` clears the body.
    pub body: Option<String>,
    pub cron_expression: Option<String>,
    pub status: Option<TaskStatus>,
}

/// A persisted task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// SQLite rowid: primary key, immutable.
    pub id: i64,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub cron_expression: String,
    pub status: TaskStatus,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

impl Task {
    pub fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: self.name.clone(),
            url: self.url.clone(),
            method: self.method,
            headers: self.headers.clone(),
            body: self.body.clone(),
            cron_expression: self.cron_expression.clone(),
            status: self.status,
        }
    }
}

/// Operator actions accepted by the `actions` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Pause,
    Resume,
    Test,
}

impl std::str::FromStr for TaskAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pause" => Ok(TaskAction::Pause),
            "resume" => Ok(TaskAction::Resume),
            "test" => Ok(TaskAction::Test),
            other => Err(format!("Invalid action: {other}")),
        }
    }
}

/// Outcome classification of one execution log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// A response arrived with a 2xx status code.
    Success,
    /// Non-2xx response, or no response at all.
    Error,
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogStatus::Success => "success",
            LogStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "error" => Ok(LogStatus::Error),
            other => Err(format!("unknown log status: {other}")),
        }
    }
}

/// What a firing (scheduled or manual) produced. Returned to test-now callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// HTTP status code; present only when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response body text; present only when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Transport failure message; present only when no response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock milliseconds from call start to completion or failure.
    #[serde(rename = "executionTime")]
    pub execution_time: u64,
}

impl ExecutionResult {
    /// The remote answered. Success iff the status code is in `[200, 300)`.
    pub fn response(status: u16, body: Option<String>, execution_time: u64) -> Self {
        Self {
            success: (200..300).contains(&status),
            status: Some(status),
            data: body,
            error: None,
            execution_time,
        }
    }

    /// No response was obtained (DNS, refused, reset, timeout).
    pub fn transport_error(message: impl Into<String>, execution_time: u64) -> Self {
        Self {
            success: false,
            status: None,
            data: None,
            error: Some(message.into()),
            execution_time,
        }
    }
}

/// A log row before the store assigns `id` and `executed_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub task_id: i64,
    pub status: LogStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub execution_time: u64,
}

impl NewLogEntry {
    pub fn from_result(task_id: i64, result: &ExecutionResult) -> Self {
        Self {
            task_id,
            status: if result.success {
                LogStatus::Success
            } else {
                LogStatus::Error
            },
            response_status: result.status,
            response_body: result.data.clone(),
            error_message: if result.status.is_some() {
                None
            } else {
                result.error.clone()
            },
            execution_time: result.execution_time,
        }
    }
}

/// A persisted execution log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub task_id: i64,
    /// Current name of the task, if it still exists.
    pub task_name: Option<String>,
    pub status: LogStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub execution_time: u64,
    /// RFC3339 timestamp assigned at write time.
    pub executed_at: String,
}

/// One page of execution history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}
