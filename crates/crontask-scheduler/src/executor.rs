use std::collections::BTreeMap;
use std::time::Duration;

use crontask_core::config::ExecutorConfig;
use tracing::{debug, warn};

use crate::{
    error::{Result, SchedulerError},
    types::{HttpMethod, Task},
};

const TRUNCATION_MARKER: &str = "…[truncated]";

/// One outbound request, built from a task's opaque request fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl From<&Task> for HttpCall {
    fn from(task: &Task) -> Self {
        Self {
            method: task.method,
            url: task.url.clone(),
            headers: task.headers.clone(),
            body: task.body.clone(),
        }
    }
}

/// What a single call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// The remote answered, whatever the status code.
    Response { status: u16, body: Option<String> },
    /// No response was obtained.
    Transport { message: String },
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Performs single-attempt HTTP calls with a uniform timeout budget.
///
/// Never fails on non-2xx codes; only connection-level problems become
/// [`HttpOutcome::Transport`].
#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self::with_timeout(config, timeout)
    }

    /// Build with an explicit timeout, overriding `config.timeout_secs`.
    pub fn with_timeout(config: &ExecutorConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SchedulerError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            max_body_bytes: config.max_response_body_bytes,
        })
    }

    pub async fn execute(&self, call: &HttpCall) -> HttpOutcome {
        let mut request = self
            .client
            .request(call.method.into(), call.url.as_str());
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = call.body.as_deref().filter(|b| !b.is_empty()) {
            request = request.body(body.to_string());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = self.describe(&e);
                debug!(url = %call.url, error = %message, "http call failed");
                return HttpOutcome::Transport { message };
            }
        };

        // The client timeout spans the body read too; running out of budget
        // there means the call as a whole did not complete.
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => Some(truncate(text, self.max_body_bytes)),
            Err(e) if e.is_timeout() => {
                let message = self.describe(&e);
                debug!(url = %call.url, status, error = %message, "response body timed out");
                return HttpOutcome::Transport { message };
            }
            Err(e) => {
                warn!(url = %call.url, status, error = %self.describe(&e), "failed to read response body");
                None
            }
        };
        HttpOutcome::Response { status, body }
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("request timed out after {}ms", self.timeout.as_millis());
        }
        error_chain(err)
    }
}

/// `Display` of the error followed by each distinct source, `: `-separated.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}
