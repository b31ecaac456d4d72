//! Error types for remote API nodes
//!
//! Display strings are shown to the user verbatim in the node's error
//! result, so they carry the server's message where there is one.

use thiserror::Error;

/// Result type for API node operations
pub type Result<T> = std::result::Result<T, ApiNodeError>;

#[derive(Debug, Error)]
pub enum ApiNodeError {
    /// No API key configured or supplied
    #[error("API Key missing")]
    MissingApiKey,

    /// Submission answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Submission succeeded without a task id
    #[error("No task_id returned")]
    NoTaskId,

    /// Transport or parse failure while submitting
    #[error("Request failed: {0}")]
    Request(String),

    /// Remote job reported failure
    #[error("{0}")]
    GenerationFailed(String),

    /// Polling budget exhausted
    #[error("Generation timeout")]
    Timeout,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Video decode failed: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid node input or core failure
    #[error(transparent)]
    Core(#[from] ck_nodes_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiNodeError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<ApiNodeError> for ck_nodes_core::Error {
    fn from(err: ApiNodeError) -> Self {
        match err {
            ApiNodeError::Core(inner) => inner,
            ApiNodeError::Config(message) => ck_nodes_core::Error::Config(message),
            other => ck_nodes_core::Error::Execution(other.to_string()),
        }
    }
}
