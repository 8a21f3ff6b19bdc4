//! Error types for Courier

use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias for Courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Courier
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Schema compilation failed for tool '{tool}': {detail}")]
    Schema { tool: String, detail: String },

    #[error("Invalid arguments for tool '{tool}': {detail}")]
    ToolInput { tool: String, detail: String },

    #[error("Tool '{tool}' returned a non-conforming result: {detail}")]
    ToolOutput { tool: String, detail: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Agent is closed")]
    AgentClosed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
