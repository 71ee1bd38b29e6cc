use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrontaskError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrontaskError {
    /// Short error code string, attached to startup log lines.
    pub fn code(&self) -> &'static str {
        match self {
            CrontaskError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CrontaskError>;
