//! Seam between the node and an inference backend
//!
//! The node handles model discovery, chat templates, tokenization and the
//! load/unload lifecycle. A backend only turns a weight folder into a
//! [`VisionLanguageModel`] and runs generation on token ids plus media.

use crate::config::{AttentionImpl, GenerationParams, QuantizationPlan};
use crate::device::InferenceDevice;
use crate::error::{Result, VlmNodeError};
use ck_nodes_core::ImageBatch;
use std::path::PathBuf;

/// What the backend can run on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub cuda_devices: usize,
    pub metal: bool,
    /// Flash attention kernels are usable
    pub flash_attention: bool,
}

/// Everything needed to load one model
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub model_name: String,
    pub model_path: PathBuf,
    pub plan: QuantizationPlan,
    pub attention: AttentionImpl,
    pub device: InferenceDevice,
}

/// Prompt tokens plus the media referenced by the chat template
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub input_ids: Vec<u32>,
    pub images: Vec<ImageBatch>,
    /// Frames of the single video clip, if any
    pub video: Option<ImageBatch>,
}

pub trait VisionLanguageModel: Send {
    /// Generate from `inputs`, returning the full sequence (prompt followed by new tokens)
    fn generate(&mut self, inputs: &ModelInputs, params: &GenerationParams) -> Result<Vec<u32>>;
}

pub trait VisionLanguageLoader: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Load the weights described by `request`
    fn load(&self, request: &LoadRequest) -> Result<Box<dyn VisionLanguageModel>>;
}

/// Loader used when no backend is linked in; every load fails
#[derive(Debug, Default)]
pub struct UnavailableLoader;

impl VisionLanguageLoader for UnavailableLoader {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn load(&self, request: &LoadRequest) -> Result<Box<dyn VisionLanguageModel>> {
        Err(VlmNodeError::model_load(
            &request.model_name,
            "no vision-language inference backend is registered",
        ))
    }
}
