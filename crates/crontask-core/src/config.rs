use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Budget for a single outbound HTTP call made on behalf of a task.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 64 * 1024; // 64 KB per log row
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Top-level config (crontask.toml + CRONTASK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrontaskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Outbound HTTP settings applied uniformly to every task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-call timeout. Exceeding it is recorded as a transport error.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Response bodies longer than this are truncated before being logged.
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_response_body_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BODY_BYTES
}
fn default_user_agent() -> String {
    concat!("crontask/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_max_page_size() -> u32 {
    MAX_PAGE_SIZE
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.crontask/tasks.db", home)
}

impl CrontaskConfig {
    /// Load config from a TOML file with CRONTASK_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `CRONTASK_EXECUTOR__TIMEOUT_SECS=5`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::from(Serialized::defaults(CrontaskConfig::default()))
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CRONTASK_").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        let config: CrontaskConfig = figment
            .extract()
            .map_err(|e| crate::error::CrontaskError::Config(e.to_string()))?;

        if config.executor.timeout_secs == 0 {
            return Err(crate::error::CrontaskError::Config(
                "executor.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if config.logs.max_page_size == 0 {
            return Err(crate::error::CrontaskError::Config(
                "logs.max_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.crontask/crontask.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> crate::error::Result<CrontaskConfig> {
        CrontaskConfig::from_figment(
            Figment::from(Serialized::defaults(CrontaskConfig::default()))
                .merge(Toml::string(toml)),
        )
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.executor.timeout_secs, 30);
        assert_eq!(config.logs.default_page_size, 50);
        assert!(config.executor.user_agent.starts_with("crontask/"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = from_toml(
            r#"
            [server]
            port = 8080

            [executor]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.executor.timeout_secs, 5);
        assert_eq!(
            config.executor.max_response_body_bytes,
            DEFAULT_MAX_RESPONSE_BODY_BYTES
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = from_toml("[executor]\ntimeout_secs = 0").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
