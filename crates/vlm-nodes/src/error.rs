//! Error types for the vision-language node

use thiserror::Error;

/// Result type for vision-language operations
pub type Result<T> = std::result::Result<T, VlmNodeError>;

#[derive(Error, Debug)]
pub enum VlmNodeError {
    /// Model folder not found in any search path
    #[error("Model '{0}' not found in prompt_generator paths.")]
    ModelNotFound(String),

    /// Model loading failed
    #[error("Failed to load model '{model}': {message}")]
    ModelLoad { model: String, message: String },

    /// Device initialization failed
    #[error("Failed to initialize device '{device}': {message}")]
    DeviceInit { device: String, message: String },

    /// Invalid node configuration
    #[error("Invalid configuration for '{setting}': {message}")]
    Configuration { setting: String, message: String },

    #[error("Chat template error: {0}")]
    Template(String),

    #[error("Tokenizer error: {message}")]
    Tokenizer { message: String },

    /// Generation was requested without a loaded model
    #[error("No model loaded")]
    NotLoaded,

    /// Inference failed
    #[error("Inference failed for node '{node_id}': {message}")]
    Inference { node_id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] ck_nodes_core::Error),
}

impl VlmNodeError {
    /// Create a model load error with context
    pub fn model_load(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn inference(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    pub fn configuration(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            setting: setting.into(),
            message: message.into(),
        }
    }

    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for VlmNodeError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<VlmNodeError> for ck_nodes_core::Error {
    fn from(err: VlmNodeError) -> Self {
        match err {
            VlmNodeError::Core(inner) => inner,
            VlmNodeError::Configuration { .. } | VlmNodeError::ModelNotFound(_) => {
                ck_nodes_core::Error::Config(err.to_string())
            }
            other => ck_nodes_core::Error::Execution(other.to_string()),
        }
    }
}
