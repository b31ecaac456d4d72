//! Load and generation settings for the vision-language node

use crate::error::{Result, VlmNodeError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Weight precision choice offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantization {
    #[serde(rename = "4-bit (VRAM-friendly)")]
    Q4,
    #[serde(rename = "8-bit (Balanced)")]
    Q8,
    #[serde(rename = "None (FP16)")]
    Fp16,
}

impl Quantization {
    pub const ALL: [Quantization; 3] = [Quantization::Q4, Quantization::Q8, Quantization::Fp16];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Q4 => "4-bit (VRAM-friendly)",
            Self::Q8 => "8-bit (Balanced)",
            Self::Fp16 => "None (FP16)",
        }
    }

    pub fn values() -> Vec<&'static str> {
        Self::ALL.iter().map(Quantization::as_str).collect()
    }

    /// How the backend should materialise the weights
    pub fn plan(&self, gpu: bool) -> QuantizationPlan {
        match self {
            Self::Q4 => QuantizationPlan::FourBit {
                quant_type: FourBitType::Nf4,
                double_quant: true,
                compute_dtype: DType::F16,
            },
            Self::Q8 => QuantizationPlan::EightBit,
            Self::Fp16 => QuantizationPlan::Full {
                dtype: if gpu { DType::F16 } else { DType::F32 },
            },
        }
    }
}

impl std::fmt::Display for Quantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantization {
    type Err = VlmNodeError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == value)
            .ok_or_else(|| {
                VlmNodeError::configuration("quantization", format!("Unsupported quantization: {}", value))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourBitType {
    Nf4,
}

/// Weight loading plan handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationPlan {
    FourBit {
        quant_type: FourBitType,
        double_quant: bool,
        compute_dtype: DType,
    },
    EightBit,
    /// Unquantised weights: f16 on GPU, f32 on CPU
    Full { dtype: DType },
}

/// Requested attention implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionMode {
    Auto,
    FlashAttention2,
    Sdpa,
}

impl AttentionMode {
    pub const VALUES: [&'static str; 3] = ["auto", "flash_attention_2", "sdpa"];

    /// Implementation actually used given whether flash attention is available
    pub fn resolve(&self, flash_available: bool) -> AttentionImpl {
        match self {
            Self::Sdpa => AttentionImpl::Sdpa,
            Self::FlashAttention2 if flash_available => AttentionImpl::FlashAttention2,
            Self::FlashAttention2 => {
                tracing::warn!("Flash attention requested but unavailable, falling back to SDPA");
                AttentionImpl::Sdpa
            }
            Self::Auto if flash_available => AttentionImpl::FlashAttention2,
            Self::Auto => AttentionImpl::Sdpa,
        }
    }
}

impl FromStr for AttentionMode {
    type Err = VlmNodeError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(Self::Auto),
            "flash_attention_2" => Ok(Self::FlashAttention2),
            "sdpa" => Ok(Self::Sdpa),
            other => Err(VlmNodeError::configuration(
                "attention_mode",
                format!("Unknown attention mode: {}", other),
            )),
        }
    }
}

/// Attention kernel the model is loaded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttentionImpl {
    Sdpa,
    FlashAttention2,
}

impl AttentionImpl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdpa => "sdpa",
            Self::FlashAttention2 => "flash_attention_2",
        }
    }
}

/// Token selection strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoding {
    /// Nucleus sampling
    Sample { temperature: f32, top_p: f32 },
    /// Deterministic beam search
    Beam { num_beams: u32 },
}

/// Generation parameters for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// 0 disables top-k filtering
    pub top_k: u32,
    pub num_beams: u32,
    /// Repetition penalty (1.0 = no penalty)
    pub repetition_penalty: f32,
    pub seed: u64,
    /// Filled from the tokenizer when the model is loaded
    pub stop_token_ids: Vec<u32>,
    pub pad_token_id: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.6,
            top_p: 0.9,
            top_k: 50,
            num_beams: 1,
            repetition_penalty: 1.1,
            seed: 1,
            stop_token_ids: Vec::new(),
            pad_token_id: None,
        }
    }
}

impl GenerationParams {
    /// Sampling only applies to single-beam generation
    pub fn decoding(&self) -> Decoding {
        if self.num_beams <= 1 {
            Decoding::Sample {
                temperature: self.temperature,
                top_p: self.top_p,
            }
        } else {
            Decoding::Beam {
                num_beams: self.num_beams,
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(VlmNodeError::configuration("max_tokens", "must be >= 1"));
        }
        if self.temperature < 0.0 {
            return Err(VlmNodeError::configuration("temperature", "must be >= 0.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(VlmNodeError::configuration("top_p", "must be 0.0-1.0"));
        }
        if self.repetition_penalty <= 0.0 {
            return Err(VlmNodeError::configuration("repetition_penalty", "must be > 0.0"));
        }
        Ok(())
    }
}

/// Factory parameters for the node
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VlmNodeConfig {
    /// Maximum number of video frames passed to the model
    pub frame_count: usize,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    /// Inference device ("auto", "cpu", "cuda", "cuda:N", "metal")
    pub device: String,
}

impl Default for VlmNodeConfig {
    fn default() -> Self {
        Self {
            frame_count: 16,
            num_beams: 1,
            repetition_penalty: 1.1,
            device: "auto".to_string(),
        }
    }
}
