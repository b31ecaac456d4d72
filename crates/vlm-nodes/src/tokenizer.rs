//! Tokenizer and special tokens from an HF model folder

use crate::error::{Result, VlmNodeError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

const EOS_CANDIDATES: [&str; 3] = ["<|im_end|>", "<|endoftext|>", "</s>"];
const EOT_TOKEN: &str = "<|eot_id|>";

/// Special token entry, either a bare string or an added-token object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpecialToken {
    Text(String),
    Added { content: String },
}

impl SpecialToken {
    pub fn content(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Added { content } => content,
        }
    }
}

/// Fields of `tokenizer_config.json` used here
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerConfig {
    pub bos_token: Option<SpecialToken>,
    pub eos_token: Option<SpecialToken>,
    pub pad_token: Option<SpecialToken>,
    /// A template string or a list of named templates
    pub chat_template: Option<Value>,
}

impl TokenizerConfig {
    /// `tokenizer_config.json` in `dir`; absent file gives the defaults
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(TOKENIZER_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            VlmNodeError::tokenizer(format!("invalid {}: {}", TOKENIZER_CONFIG_FILE, e))
        })
    }
}

/// Wrapper around the tokenizers crate with resolved special tokens
pub struct VlmTokenizer {
    inner: tokenizers::Tokenizer,
    bos_token: Option<String>,
    eos_token: Option<String>,
    eos_id: Option<u32>,
    eot_id: Option<u32>,
    pad_id: Option<u32>,
}

impl VlmTokenizer {
    /// Load `tokenizer.json` and special tokens from a model folder
    pub fn from_dir(dir: &Path, config: &TokenizerConfig) -> Result<Self> {
        let path = dir.join(TOKENIZER_FILE);
        let inner = tokenizers::Tokenizer::from_file(&path).map_err(|e| {
            VlmNodeError::model_load(
                dir.display().to_string(),
                format!("Failed to load tokenizer: {}", e),
            )
        })?;
        Ok(Self::new(inner, config))
    }

    pub fn new(inner: tokenizers::Tokenizer, config: &TokenizerConfig) -> Self {
        let vocab = inner.get_vocab(true);
        let token_id = |token: &Option<SpecialToken>| {
            token.as_ref().and_then(|t| vocab.get(t.content()).copied())
        };

        let eos_token = config
            .eos_token
            .as_ref()
            .map(|t| t.content().to_string())
            .or_else(|| Self::find_special_token(&vocab, &EOS_CANDIDATES).map(|(name, _)| name.to_string()));
        let eos_id = eos_token.as_deref().and_then(|t| vocab.get(t).copied());
        let eot_id = vocab.get(EOT_TOKEN).copied().filter(|&id| Some(id) != eos_id);

        Self {
            bos_token: config.bos_token.as_ref().map(|t| t.content().to_string()),
            eos_token,
            eos_id,
            eot_id,
            pad_id: token_id(&config.pad_token),
            inner,
        }
    }

    fn find_special_token<'a>(vocab: &HashMap<String, u32>, names: &[&'a str]) -> Option<(&'a str, u32)> {
        names
            .iter()
            .find_map(|name| vocab.get(*name).map(|&id| (*name, id)))
    }

    /// Encode a rendered prompt; the template already carries the special tokens
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| VlmNodeError::tokenizer(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token IDs back to text
    pub fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(tokens, skip_special_tokens)
            .map_err(|e| VlmNodeError::tokenizer(format!("Decoding failed: {}", e)))
    }

    pub fn bos_token(&self) -> Option<&str> {
        self.bos_token.as_deref()
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_id
    }

    pub fn pad_token_id(&self) -> Option<u32> {
        self.pad_id
    }

    /// End-of-sequence plus end-of-turn when the vocabulary has one
    pub fn stop_token_ids(&self) -> Vec<u32> {
        self.eos_id.into_iter().chain(self.eot_id).collect()
    }
}
