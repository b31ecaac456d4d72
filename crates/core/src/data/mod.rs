//! Runtime data types exchanged between the host and nodes
//!
//! Every node input and output is a [`RuntimeData`] variant. Nodes declare
//! which variants they accept through their [`NodeSchema`](crate::nodes::NodeSchema)
//! and read them back through the typed accessors on [`NodeInputs`].

mod audio;
mod image;
mod latent;

pub use audio::AudioWaveform;
pub use image::ImageBatch;
pub use latent::{Latent, LatentCodec};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory value flowing through a node socket
///
/// Replaces the host's untyped "any" sockets with an explicit sum type.
/// `None` doubles as the "not connected" marker for optional inputs.
#[derive(Debug, Clone, Default)]
pub enum RuntimeData {
    /// Null value / pass-through placeholder
    #[default]
    None,

    /// Batch of images or video frames, (B, H, W, C) in [0, 1]
    Image(ImageBatch),

    /// Video latent with optional noise mask
    Latent(Latent),

    /// Audio waveform (1, channels, samples)
    Audio(AudioWaveform),

    /// UTF-8 text
    Text(String),

    /// Integer scalar
    Int(i64),

    /// Float scalar
    Float(f64),

    /// Boolean scalar
    Bool(bool),

    /// JSON payload (dictionaries, API responses)
    Json(serde_json::Value),

    /// List of values (for list-aware inputs)
    List(Vec<RuntimeData>),

    /// Host-provided latent codec (VAE)
    Codec(Arc<dyn LatentCodec>),
}

impl RuntimeData {
    /// Get data type name as string (for logging and error messages)
    pub fn data_type(&self) -> &'static str {
        match self {
            RuntimeData::None => "none",
            RuntimeData::Image(_) => "image",
            RuntimeData::Latent(_) => "latent",
            RuntimeData::Audio(_) => "audio",
            RuntimeData::Text(_) => "text",
            RuntimeData::Int(_) => "int",
            RuntimeData::Float(_) => "float",
            RuntimeData::Bool(_) => "bool",
            RuntimeData::Json(_) => "json",
            RuntimeData::List(_) => "list",
            RuntimeData::Codec(_) => "codec",
        }
    }

    /// Check for the null variant
    pub fn is_none(&self) -> bool {
        matches!(self, RuntimeData::None)
    }

    pub fn as_image(&self) -> Option<&ImageBatch> {
        match self {
            RuntimeData::Image(images) => Some(images),
            _ => None,
        }
    }

    pub fn as_latent(&self) -> Option<&Latent> {
        match self {
            RuntimeData::Latent(latent) => Some(latent),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RuntimeData::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<ImageBatch> for RuntimeData {
    fn from(images: ImageBatch) -> Self {
        RuntimeData::Image(images)
    }
}

impl From<Latent> for RuntimeData {
    fn from(latent: Latent) -> Self {
        RuntimeData::Latent(latent)
    }
}

impl From<String> for RuntimeData {
    fn from(text: String) -> Self {
        RuntimeData::Text(text)
    }
}

impl From<&str> for RuntimeData {
    fn from(text: &str) -> Self {
        RuntimeData::Text(text.to_string())
    }
}

impl From<i64> for RuntimeData {
    fn from(value: i64) -> Self {
        RuntimeData::Int(value)
    }
}

impl From<f64> for RuntimeData {
    fn from(value: f64) -> Self {
        RuntimeData::Float(value)
    }
}

impl From<bool> for RuntimeData {
    fn from(value: bool) -> Self {
        RuntimeData::Bool(value)
    }
}

impl From<serde_json::Value> for RuntimeData {
    fn from(value: serde_json::Value) -> Self {
        RuntimeData::Json(value)
    }
}

/// Named inputs passed to a node invocation
///
/// Missing inputs and inputs holding [`RuntimeData::None`] are treated the
/// same way: optional accessors fall back to their default, required
/// accessors fail with [`Error::InvalidInput`].
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    values: HashMap<String, RuntimeData>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RuntimeData>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RuntimeData>) {
        self.values.insert(name.into(), value.into());
    }

    /// Raw access; `None` for missing or null inputs
    pub fn get(&self, name: &str) -> Option<&RuntimeData> {
        self.values.get(name).filter(|value| !value.is_none())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Input names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Remove and return an input, `RuntimeData::None` when absent
    pub fn take(&mut self, name: &str) -> RuntimeData {
        self.values.remove(name).unwrap_or_default()
    }

    /// Clone of any input, `RuntimeData::None` when absent
    pub fn any(&self, name: &str) -> RuntimeData {
        self.values.get(name).cloned().unwrap_or_default()
    }

    pub fn image(&self, name: &str) -> Result<&ImageBatch> {
        match self.get(name) {
            Some(RuntimeData::Image(images)) => Ok(images),
            Some(other) => Err(wrong_type(name, "image", other)),
            None => Err(missing(name)),
        }
    }

    pub fn opt_image(&self, name: &str) -> Result<Option<&ImageBatch>> {
        match self.get(name) {
            Some(RuntimeData::Image(images)) => Ok(Some(images)),
            Some(other) => Err(wrong_type(name, "image", other)),
            None => Ok(None),
        }
    }

    pub fn latent(&self, name: &str) -> Result<&Latent> {
        match self.get(name) {
            Some(RuntimeData::Latent(latent)) => Ok(latent),
            Some(other) => Err(wrong_type(name, "latent", other)),
            None => Err(missing(name)),
        }
    }

    pub fn codec(&self, name: &str) -> Result<Arc<dyn LatentCodec>> {
        match self.get(name) {
            Some(RuntimeData::Codec(codec)) => Ok(Arc::clone(codec)),
            Some(other) => Err(wrong_type(name, "codec", other)),
            None => Err(missing(name)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(RuntimeData::Text(text)) => Ok(text),
            Some(other) => Err(wrong_type(name, "text", other)),
            None => Err(missing(name)),
        }
    }

    pub fn text_or(&self, name: &str, default: &str) -> Result<String> {
        match self.get(name) {
            Some(RuntimeData::Text(text)) => Ok(text.clone()),
            Some(other) => Err(wrong_type(name, "text", other)),
            None => Ok(default.to_string()),
        }
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            Some(RuntimeData::Text(text)) => Ok(Some(text)),
            Some(other) => Err(wrong_type(name, "text", other)),
            None => Ok(None),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            Some(RuntimeData::Int(value)) => Ok(*value),
            Some(other) => Err(wrong_type(name, "int", other)),
            None => Ok(default),
        }
    }

    /// Floats also accept integer inputs
    pub fn float_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            Some(RuntimeData::Float(value)) => Ok(*value),
            Some(RuntimeData::Int(value)) => Ok(*value as f64),
            Some(other) => Err(wrong_type(name, "float", other)),
            None => Ok(default),
        }
    }

    /// Booleans also accept the "true"/"false" choice strings used by combo inputs
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            Some(RuntimeData::Bool(value)) => Ok(*value),
            Some(RuntimeData::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::invalid_input(
                    name,
                    format!("expected \"true\" or \"false\", got \"{}\"", text),
                )),
            },
            Some(other) => Err(wrong_type(name, "bool", other)),
            None => Ok(default),
        }
    }

    pub fn json(&self, name: &str) -> Result<Option<&serde_json::Value>> {
        match self.get(name) {
            Some(RuntimeData::Json(value)) => Ok(Some(value)),
            Some(other) => Err(wrong_type(name, "json", other)),
            None => Ok(None),
        }
    }
}

fn missing(name: &str) -> Error {
    Error::invalid_input(name, "required input is missing")
}

fn wrong_type(name: &str, expected: &str, got: &RuntimeData) -> Error {
    Error::invalid_input(
        name,
        format!("expected {}, got {}", expected, got.data_type()),
    )
}

/// File reference shown by the host UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiFile {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl UiFile {
    /// File in the host's output folder
    pub fn output(filename: impl Into<String>, subfolder: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            kind: "output".to_string(),
        }
    }
}

/// Side channel displayed by the host next to the node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<UiFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<UiFile>,
}

impl UiPayload {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            text: vec![message.into()],
            ..Self::default()
        }
    }
}

/// Result of one node invocation
///
/// `outputs` is ordered and matches the node's declared output sockets.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub outputs: Vec<RuntimeData>,
    pub ui: Option<UiPayload>,
}

impl NodeOutput {
    pub fn new(outputs: Vec<RuntimeData>) -> Self {
        Self { outputs, ui: None }
    }

    pub fn single(output: impl Into<RuntimeData>) -> Self {
        Self::new(vec![output.into()])
    }

    pub fn with_ui(mut self, ui: UiPayload) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Output at `index`, `RuntimeData::None` when out of range
    pub fn get(&self, index: usize) -> &RuntimeData {
        const NONE: &RuntimeData = &RuntimeData::None;
        self.outputs.get(index).unwrap_or(NONE)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_input_is_absent() {
        let inputs = NodeInputs::new().with("a", RuntimeData::None);
        assert!(!inputs.contains("a"));
        assert_eq!(inputs.text_or("a", "fallback").unwrap(), "fallback");
        assert!(inputs.text("a").is_err());
    }

    #[test]
    fn test_wrong_variant_is_rejected() {
        let inputs = NodeInputs::new().with("count", "five");
        let err = inputs.int_or("count", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref input, .. } if input == "count"));
    }

    #[test]
    fn test_bool_accepts_choice_strings() {
        let inputs = NodeInputs::new()
            .with("a", "true")
            .with("b", "False")
            .with("c", "maybe");
        assert!(inputs.bool_or("a", false).unwrap());
        assert!(!inputs.bool_or("b", true).unwrap());
        assert!(inputs.bool_or("c", true).is_err());
        assert!(inputs.bool_or("d", true).unwrap());
    }

    #[test]
    fn test_float_accepts_int() {
        let inputs = NodeInputs::new().with("strength", 1i64);
        assert_eq!(inputs.float_or("strength", 0.5).unwrap(), 1.0);
    }

    #[test]
    fn test_ui_file_serializes_type_key() {
        let file = UiFile::output("clip.mp4", "");
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["filename"], "clip.mp4");
    }

    #[test]
    fn test_output_get_out_of_range() {
        let output = NodeOutput::single(3i64);
        assert!(matches!(output.get(0), RuntimeData::Int(3)));
        assert!(output.get(5).is_none());
    }
}
