use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptbakError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Tool(#[from] ToolError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("required tool not found: {0}")]
    Missing(String),
    #[error("{tool}: {source}")]
    Spawn { tool: String, source: io::Error },
    #[error("{tool} failed with exit code {code}{detail}")]
    Failed { tool: String, code: i32, detail: String },
    #[error("unrecognized output from {tool}: {detail}")]
    Unrecognized { tool: String, detail: String },
}

pub type Result<T> = std::result::Result<T, CryptbakError>;

impl CryptbakError {
    pub fn message(msg: impl Into<String>) -> Self {
        CryptbakError::Message(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        CryptbakError::Usage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CryptbakError::NotFound(msg.into())
    }
}

impl ToolError {
    pub fn failed(tool: &str, code: i32, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let detail = if stderr.is_empty() {
            String::new()
        } else {
            format!(": {}", stderr)
        };
        ToolError::Failed {
            tool: tool.to_string(),
            code,
            detail,
        }
    }
}
