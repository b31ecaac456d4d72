//! Local vision-language model node for the CK node pack
//!
//! `QwenVL_Local_Loader` finds model folders under `models/prompt_generator`,
//! renders the folder's chat template, tokenizes the prompt and hands the
//! tokens and frames to a [`VisionLanguageLoader`] backend. The loaded model
//! is cached per node until the load signature changes.
//!
//! With the `candle` feature the candle backend is registered when no other
//! loader is supplied. Its decoding loop ([`generation`]) samples with a
//! seeded [`Sampler`] for single-beam calls and runs beam search otherwise.
//!
//! # Example
//!
//! ```ignore
//! use ck_nodes_vlm::register_vlm_nodes;
//!
//! let mut builder = NodeRegistryBuilder::new();
//! register_vlm_nodes(&mut builder, &ctx, Some(Arc::new(backend)));
//! ```

pub mod backend;
#[cfg(feature = "candle")]
pub mod candle;
pub mod config;
pub mod conversation;
pub mod device;
pub mod error;
pub mod generation;
pub mod models;
pub mod node;
pub mod sampling;
pub mod session;
pub mod template;
pub mod tokenizer;

mod registry;

pub use backend::{
    BackendCapabilities, LoadRequest, ModelInputs, UnavailableLoader, VisionLanguageLoader,
    VisionLanguageModel,
};
#[cfg(feature = "candle")]
pub use candle::CandleLoader;
pub use config::{AttentionImpl, AttentionMode, GenerationParams, Quantization, QuantizationPlan, VlmNodeConfig};
pub use conversation::Conversation;
pub use device::{DeviceSelector, InferenceDevice};
pub use error::{Result, VlmNodeError};
pub use generation::{generate, LogitsModel};
pub use models::ModelCatalog;
pub use node::{QwenVlNode, QwenVlNodeFactory};
pub use registry::register_vlm_nodes;
pub use sampling::Sampler;
pub use session::{LoadOutcome, LoadSettings, ModelSignature, VlmSession};
