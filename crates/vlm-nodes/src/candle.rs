//! Candle backend running the text decoder of Qwen3 / Qwen3-VL folders
//!
//! Weights are memory-mapped from the folder's `*.safetensors` shards. Only
//! the language model is loaded; images and video frames are rendered into
//! the prompt by the chat template but their pixels are not encoded.

use crate::backend::{BackendCapabilities, LoadRequest, ModelInputs, VisionLanguageLoader, VisionLanguageModel};
use crate::config::{DType, GenerationParams, QuantizationPlan};
use crate::device::InferenceDevice;
use crate::error::{Result, VlmNodeError};
use crate::generation::{generate, LogitsModel};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen3::{Config, ModelForCausalLM};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl TryFrom<&InferenceDevice> for Device {
    type Error = VlmNodeError;

    fn try_from(device: &InferenceDevice) -> Result<Self> {
        let init = |e: candle_core::Error| VlmNodeError::DeviceInit {
            device: device.to_string(),
            message: e.to_string(),
        };
        match device {
            InferenceDevice::Cpu => Ok(Device::Cpu),
            InferenceDevice::Cuda(idx) => Device::new_cuda(*idx).map_err(init),
            InferenceDevice::Metal => Device::new_metal(0).map_err(init),
        }
    }
}

/// Loader backed by candle
#[derive(Debug, Default)]
pub struct CandleLoader;

impl CandleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl VisionLanguageLoader for CandleLoader {
    fn name(&self) -> &str {
        "candle"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            cuda_devices: usize::from(candle_core::utils::cuda_is_available()),
            metal: candle_core::utils::metal_is_available(),
            flash_attention: false,
        }
    }

    fn load(&self, request: &LoadRequest) -> Result<Box<dyn VisionLanguageModel>> {
        let device = Device::try_from(&request.device)?;
        let dtype = weight_dtype(&request.plan, request.device.is_gpu());
        let fail = |message: String| VlmNodeError::model_load(&request.model_name, message);

        let raw = std::fs::read_to_string(request.model_path.join("config.json"))
            .map_err(|e| fail(format!("config.json: {}", e)))?;
        let raw: Value = serde_json::from_str(&raw).map_err(|e| fail(format!("config.json: {}", e)))?;
        let vision = raw.get("text_config").is_some();
        let config: Config =
            serde_json::from_value(text_config(&raw)).map_err(|e| fail(format!("config.json: {}", e)))?;

        let shards = safetensor_shards(&request.model_path)?;
        if shards.is_empty() {
            return Err(fail("no .safetensors weights in model folder".to_string()));
        }
        debug!(shards = shards.len(), ?dtype, vision, "Mapping weights");

        // SAFETY: the shards are not modified while the model holds the mapping
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&shards, dtype, &device) }
            .map_err(|e| fail(e.to_string()))?;
        let vb = if vision {
            vb.rename_f(|name: &str| match name.strip_prefix("model.") {
                Some(rest) => format!("model.language_model.{}", rest),
                None => name.to_string(),
            })
        } else {
            vb
        };

        let model = ModelForCausalLM::new(&config, vb).map_err(|e| fail(e.to_string()))?;
        info!(
            model = %request.model_name,
            device = %request.device,
            ?dtype,
            layers = config.num_hidden_layers,
            "Candle model loaded"
        );

        Ok(Box::new(CandleModel {
            model,
            device,
            vision,
        }))
    }
}

fn weight_dtype(plan: &QuantizationPlan, gpu: bool) -> candle_core::DType {
    let dtype = match plan {
        QuantizationPlan::Full { dtype } => *dtype,
        QuantizationPlan::FourBit { compute_dtype, .. } => {
            warn!("4-bit weights are not supported by the candle backend, loading unquantised");
            *compute_dtype
        }
        QuantizationPlan::EightBit => {
            warn!("8-bit weights are not supported by the candle backend, loading unquantised");
            if gpu {
                DType::F16
            } else {
                DType::F32
            }
        }
    };
    match dtype {
        // half precision matmuls are not available on every CPU build
        DType::F16 if gpu => candle_core::DType::F16,
        _ => candle_core::DType::F32,
    }
}

/// Text-model settings with defaults for keys VL folders leave out
fn text_config(raw: &Value) -> Value {
    let mut config: Map<String, Value> = raw
        .get("text_config")
        .or(Some(raw))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let layers = config.get("num_hidden_layers").cloned().unwrap_or(json!(0));
    let tie = raw.get("tie_word_embeddings").cloned().unwrap_or(json!(false));
    for (key, value) in [
        ("attention_bias", json!(false)),
        ("use_sliding_window", json!(false)),
        ("sliding_window", Value::Null),
        ("max_window_layers", layers),
        ("tie_word_embeddings", tie),
        ("hidden_act", json!("silu")),
    ] {
        config.entry(key).or_insert(value);
    }
    Value::Object(config)
}

fn safetensor_shards(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "safetensors") {
            shards.push(path);
        }
    }
    shards.sort();
    Ok(shards)
}

struct CandleModel {
    model: ModelForCausalLM,
    device: Device,
    vision: bool,
}

impl CandleModel {
    fn logits(&mut self, tokens: &[u32], offset: usize) -> candle_core::Result<Vec<f32>> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        self.model
            .forward(&input, offset)?
            .flatten_all()?
            .to_dtype(candle_core::DType::F32)?
            .to_vec1::<f32>()
    }
}

impl LogitsModel for CandleModel {
    fn forward(&mut self, tokens: &[u32], offset: usize) -> Result<Vec<f32>> {
        self.logits(tokens, offset)
            .map_err(|e| VlmNodeError::inference("candle", e.to_string()))
    }

    fn reset(&mut self) {
        self.model.clear_kv_cache();
    }
}

impl VisionLanguageModel for CandleModel {
    fn generate(&mut self, inputs: &ModelInputs, params: &GenerationParams) -> Result<Vec<u32>> {
        let media = inputs.images.len() + usize::from(inputs.video.is_some());
        if media > 0 {
            warn!(
                media,
                vision_weights = self.vision,
                "Candle backend runs the text decoder only, media inputs are not encoded"
            );
        }
        generate(self, &inputs.input_ids, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_config_overlays_defaults() {
        let raw = json!({
            "tie_word_embeddings": true,
            "text_config": {"num_hidden_layers": 28, "hidden_size": 2048}
        });
        let config = text_config(&raw);
        assert_eq!(config["num_hidden_layers"], 28);
        assert_eq!(config["max_window_layers"], 28);
        assert_eq!(config["tie_word_embeddings"], true);
        assert!(config["sliding_window"].is_null());
    }

    #[test]
    fn test_plain_config_is_used_directly() {
        let raw = json!({"num_hidden_layers": 4, "attention_bias": true});
        let config = text_config(&raw);
        assert_eq!(config["attention_bias"], true);
        assert_eq!(config["max_window_layers"], 4);
    }

    #[test]
    fn test_weight_dtype_on_cpu_is_f32() {
        assert_eq!(
            weight_dtype(&QuantizationPlan::Full { dtype: DType::F16 }, false),
            candle_core::DType::F32
        );
        assert_eq!(weight_dtype(&QuantizationPlan::EightBit, true), candle_core::DType::F16);
    }

    #[test]
    fn test_missing_weights_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"num_hidden_layers": 1}"#).unwrap();
        let request = LoadRequest {
            model_name: "Tiny".to_string(),
            model_path: dir.path().to_path_buf(),
            plan: QuantizationPlan::Full { dtype: DType::F32 },
            attention: crate::config::AttentionImpl::Sdpa,
            device: InferenceDevice::Cpu,
        };
        assert!(CandleLoader::new().load(&request).is_err());
    }
}
