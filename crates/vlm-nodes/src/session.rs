//! Model lifecycle: `Unloaded → Loaded(signature) → Unloaded`
//!
//! A loaded model is reused only when the caller asks to keep it and the
//! requested signature matches; any other load releases it first.

use crate::backend::{LoadRequest, ModelInputs, VisionLanguageLoader, VisionLanguageModel};
use crate::config::{AttentionImpl, AttentionMode, GenerationParams, Quantization};
use crate::conversation::Conversation;
use crate::device::{DeviceSelector, InferenceDevice};
use crate::error::{Result, VlmNodeError};
use crate::models::ModelCatalog;
use crate::template::ChatTemplate;
use crate::tokenizer::{TokenizerConfig, VlmTokenizer};
use std::sync::Arc;
use tracing::{debug, info};

/// Identity of a loaded model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSignature {
    pub model_name: String,
    pub quantization: Quantization,
    pub attention: AttentionImpl,
    pub device: InferenceDevice,
}

/// Load request as given by the node inputs
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    pub model_name: String,
    pub quantization: String,
    pub attention_mode: String,
    pub device: String,
    pub keep_loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Reused,
    Loaded,
}

struct LoadedModel {
    signature: ModelSignature,
    model: Box<dyn VisionLanguageModel>,
    tokenizer: VlmTokenizer,
    template: ChatTemplate,
}

enum SessionState {
    Unloaded,
    Loaded(Box<LoadedModel>),
}

pub struct VlmSession {
    loader: Arc<dyn VisionLanguageLoader>,
    catalog: ModelCatalog,
    state: SessionState,
}

impl VlmSession {
    pub fn new(loader: Arc<dyn VisionLanguageLoader>, catalog: ModelCatalog) -> Self {
        Self {
            loader,
            catalog,
            state: SessionState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SessionState::Loaded(_))
    }

    pub fn signature(&self) -> Option<&ModelSignature> {
        match &self.state {
            SessionState::Loaded(loaded) => Some(&loaded.signature),
            SessionState::Unloaded => None,
        }
    }

    /// Signature the settings resolve to on this backend
    pub fn resolve_signature(&self, settings: &LoadSettings) -> Result<ModelSignature> {
        let caps = self.loader.capabilities();
        let quantization: Quantization = settings.quantization.parse()?;
        let attention = settings
            .attention_mode
            .parse::<AttentionMode>()?
            .resolve(caps.flash_attention);
        let device = DeviceSelector::from_config(&settings.device, &caps)?;
        Ok(ModelSignature {
            model_name: settings.model_name.clone(),
            quantization,
            attention,
            device,
        })
    }

    /// Make the requested model current
    pub fn load(&mut self, settings: &LoadSettings) -> Result<LoadOutcome> {
        let signature = self.resolve_signature(settings)?;
        if settings.keep_loaded && self.signature() == Some(&signature) {
            debug!(model = %signature.model_name, "Reusing loaded model");
            return Ok(LoadOutcome::Reused);
        }

        self.unload();
        let model_path = self.catalog.resolve(&signature.model_name)?;

        let tokenizer_config = TokenizerConfig::from_dir(&model_path)?;
        let tokenizer = VlmTokenizer::from_dir(&model_path, &tokenizer_config)?;
        let template = ChatTemplate::from_dir(&model_path, &tokenizer_config)?;

        let request = LoadRequest {
            model_name: signature.model_name.clone(),
            model_path,
            plan: signature.quantization.plan(signature.device.is_gpu()),
            attention: signature.attention,
            device: signature.device,
        };
        info!(
            path = %request.model_path.display(),
            quantization = %signature.quantization,
            attention = signature.attention.as_str(),
            device = %signature.device,
            backend = self.loader.name(),
            "Loading vision-language model"
        );

        let model = self.loader.load(&request).map_err(|e| match e {
            VlmNodeError::ModelLoad { .. } => e,
            other => VlmNodeError::model_load(&signature.model_name, other.to_string()),
        })?;

        self.state = SessionState::Loaded(Box::new(LoadedModel {
            signature,
            model,
            tokenizer,
            template,
        }));
        Ok(LoadOutcome::Loaded)
    }

    /// Release the model, tokenizer and template
    pub fn unload(&mut self) {
        if let SessionState::Loaded(loaded) = std::mem::replace(&mut self.state, SessionState::Unloaded) {
            info!(model = %loaded.signature.model_name, "Unloaded vision-language model");
        }
    }

    /// Answer `conversation` with the loaded model
    pub fn generate(&mut self, conversation: &Conversation, params: &GenerationParams) -> Result<String> {
        let loaded = match &mut self.state {
            SessionState::Loaded(loaded) => loaded,
            SessionState::Unloaded => return Err(VlmNodeError::NotLoaded),
        };
        params.validate()?;

        let prompt = loaded.template.render(
            &conversation.messages,
            true,
            loaded.tokenizer.bos_token(),
            loaded.tokenizer.eos_token(),
        )?;
        let input_ids = loaded.tokenizer.encode(&prompt)?;
        let prompt_len = input_ids.len();

        let params = GenerationParams {
            stop_token_ids: loaded.tokenizer.stop_token_ids(),
            pad_token_id: loaded.tokenizer.pad_token_id(),
            ..params.clone()
        };
        let inputs = ModelInputs {
            input_ids,
            images: conversation.image.iter().cloned().collect(),
            video: conversation.video.clone(),
        };

        debug!(prompt_tokens = prompt_len, decoding = ?params.decoding(), "Generating");
        let output = loaded.model.generate(&inputs, &params)?;
        let new_tokens = output.get(prompt_len..).unwrap_or_default();
        let text = loaded.tokenizer.decode(new_tokens, true)?;
        Ok(text.trim().to_string())
    }
}
