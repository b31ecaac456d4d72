//! `QwenVL_Local_Loader`: describe an image or video with a local model

use crate::backend::VisionLanguageLoader;
use crate::config::{AttentionMode, GenerationParams, Quantization, VlmNodeConfig};
use crate::conversation::Conversation;
use crate::error::VlmNodeError;
use crate::models::ModelCatalog;
use crate::session::{LoadSettings, VlmSession};
use async_trait::async_trait;
use ck_nodes_core::nodes::parse_params;
use ck_nodes_core::{
    AsyncNode, AsyncNodeWrapper, DataKind, InputSpec, Node, NodeFactory, NodeInputs, NodeOutput,
    NodeSchema, Result,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

pub const NODE_TYPE: &str = "QwenVL_Local_Loader";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Describe the content accurately.";
pub const DEFAULT_USER_PROMPT: &str = "Describe this image in detail.";
const MAX_SEED: i64 = u32::MAX as i64;

pub struct QwenVlNode {
    node_id: String,
    session: Arc<Mutex<VlmSession>>,
    config: VlmNodeConfig,
}

impl QwenVlNode {
    pub fn new(node_id: impl Into<String>, session: VlmSession, config: VlmNodeConfig) -> Self {
        Self {
            node_id: node_id.into(),
            session: Arc::new(Mutex::new(session)),
            config,
        }
    }

    /// Shared handle to the model session
    pub fn session(&self) -> Arc<Mutex<VlmSession>> {
        Arc::clone(&self.session)
    }

    fn load_settings(&self, inputs: &NodeInputs) -> Result<LoadSettings> {
        Ok(LoadSettings {
            model_name: inputs.text("model_name")?.to_string(),
            quantization: inputs.text_or("quantization", Quantization::Fp16.as_str())?,
            attention_mode: inputs.text_or("attention_mode", "auto")?,
            device: self.config.device.clone(),
            keep_loaded: inputs.bool_or("keep_model_loaded", true)?,
        })
    }

    fn generation_params(&self, inputs: &NodeInputs) -> Result<GenerationParams> {
        let max_tokens = inputs.int_or("max_tokens", 512)?;
        let seed = inputs.int_or("seed", 1)?;
        Ok(GenerationParams {
            max_new_tokens: u32::try_from(max_tokens.max(0)).unwrap_or(u32::MAX),
            temperature: inputs.float_or("temperature", 0.6)? as f32,
            top_p: inputs.float_or("top_p", 0.9)? as f32,
            num_beams: self.config.num_beams,
            repetition_penalty: self.config.repetition_penalty,
            seed: seed.clamp(0, MAX_SEED) as u64,
            ..GenerationParams::default()
        })
    }
}

#[async_trait]
impl AsyncNode for QwenVlNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let settings = self.load_settings(&inputs)?;
        let params = self.generation_params(&inputs)?;
        let conversation = Conversation::build(
            &inputs.text_or("system_prompt", DEFAULT_SYSTEM_PROMPT)?,
            &inputs.text_or("user_prompt", DEFAULT_USER_PROMPT)?,
            inputs.opt_image("image")?,
            inputs.opt_image("video")?,
            self.config.frame_count,
        );

        let session = Arc::clone(&self.session);
        let node_id = self.node_id.clone();
        let response = tokio::task::spawn_blocking(move || {
            let mut session = session.lock();
            session.load(&settings)?;
            let result = session.generate(&conversation, &params);
            if !settings.keep_loaded {
                session.unload();
            }
            result
        })
        .await
        .map_err(|e| VlmNodeError::inference(node_id, e.to_string()))??;

        tracing::debug!(node_id = %self.node_id, chars = response.len(), "Generated response");
        Ok(NodeOutput::single(response))
    }
}

pub struct QwenVlNodeFactory {
    catalog: ModelCatalog,
    loader: Arc<dyn VisionLanguageLoader>,
}

impl QwenVlNodeFactory {
    pub fn new(catalog: ModelCatalog, loader: Arc<dyn VisionLanguageLoader>) -> Self {
        Self { catalog, loader }
    }
}

impl NodeFactory for QwenVlNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Qwen3VL (Local Loader) (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Describes images or video frames with a local vision-language model")
            .category("AILab/Local")
            .function("process")
            .input(
                InputSpec::required("model_name", DataKind::String)
                    .choices(self.catalog.installed_models())
                    .tooltip("Select a model folder located in 'models/prompt_generator'."),
            )
            .input(
                InputSpec::required("quantization", DataKind::String)
                    .choices(Quantization::values())
                    .default(Quantization::Fp16.as_str())
                    .tooltip("Precision vs VRAM. 4-bit is best for low VRAM, FP16 for best quality."),
            )
            .input(
                InputSpec::required("system_prompt", DataKind::String)
                    .default(DEFAULT_SYSTEM_PROMPT)
                    .multiline()
                    .tooltip("System instructions defining how the AI should behave."),
            )
            .input(
                InputSpec::required("user_prompt", DataKind::String)
                    .default(DEFAULT_USER_PROMPT)
                    .multiline()
                    .tooltip("The specific query or instruction for the image/video."),
            )
            .input(
                InputSpec::required("max_tokens", DataKind::Int)
                    .default(512)
                    .range(64.0, 4096.0),
            )
            .input(
                InputSpec::required("temperature", DataKind::Float)
                    .default(0.6)
                    .range(0.1, 1.0),
            )
            .input(
                InputSpec::required("top_p", DataKind::Float)
                    .default(0.9)
                    .range(0.0, 1.0),
            )
            .input(
                InputSpec::required("keep_model_loaded", DataKind::Boolean)
                    .default(true)
                    .tooltip("Keeps the model in memory for faster subsequent generations."),
            )
            .input(
                InputSpec::required("seed", DataKind::Int)
                    .default(1)
                    .range(1.0, MAX_SEED as f64)
                    .tooltip("Control randomness."),
            )
            .input(InputSpec::optional("image", DataKind::Image))
            .input(InputSpec::optional("video", DataKind::Image))
            .input(InputSpec::optional("attention_mode", DataKind::String).choices(AttentionMode::VALUES))
            .output("RESPONSE", DataKind::String)
            .config_schema_from::<VlmNodeConfig>()
    }

    fn create(&self, node_id: String, params: &Value) -> Result<Box<dyn Node>> {
        let config: VlmNodeConfig = parse_params(params)?;
        tracing::info!(node_id = %node_id, backend = self.loader.name(), "Vision-language node initialized");
        let session = VlmSession::new(Arc::clone(&self.loader), self.catalog.clone());
        Ok(Box::new(AsyncNodeWrapper(Arc::new(QwenVlNode::new(node_id, session, config)))))
    }
}
