//! Error types for CK node core

use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while registering or running nodes
#[derive(Debug, Error)]
pub enum Error {
    /// Node execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Invalid input (missing, wrong variant, out of range)
    #[error("Invalid input '{input}': {message}")]
    InvalidInput {
        /// Name of the offending input
        input: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown node type requested from the registry
    #[error("No node factory registered for type '{node_type}'. Available types: {available:?}")]
    UnknownNodeType {
        node_type: String,
        available: Vec<String>,
    },

    /// Latent codec failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid input error with context
    pub fn invalid_input(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<png::EncodingError> for Error {
    fn from(err: png::EncodingError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Other(format!("Shape error: {}", err))
    }
}
