//! Node schema definitions
//!
//! All nodes receive and emit [`RuntimeData`] variants. The schema tells
//! the host which sockets a node has, which variant each socket carries,
//! and the widget constraints (defaults, bounds, choices) of scalar inputs.

use crate::data::{NodeInputs, RuntimeData};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Category every node in this pack is listed under
pub const CATEGORY: &str = "CKNodes";

/// Socket data kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataKind {
    Image,
    Latent,
    Audio,
    String,
    Int,
    Float,
    Boolean,
    Json,
    Vae,
    /// Accepts or produces any variant
    #[serde(rename = "*")]
    Any,
}

impl DataKind {
    /// Whether `data` can be carried by a socket of this kind
    pub fn accepts(&self, data: &RuntimeData) -> bool {
        match (self, data) {
            (DataKind::Any, _) => true,
            // list-aware inputs receive every value wrapped in a list
            (_, RuntimeData::List(_)) => true,
            (DataKind::Image, RuntimeData::Image(_)) => true,
            (DataKind::Latent, RuntimeData::Latent(_)) => true,
            (DataKind::Audio, RuntimeData::Audio(_)) => true,
            (DataKind::String, RuntimeData::Text(_)) => true,
            (DataKind::Int, RuntimeData::Int(_)) => true,
            (DataKind::Float, RuntimeData::Float(_) | RuntimeData::Int(_)) => true,
            (DataKind::Boolean, RuntimeData::Bool(_) | RuntimeData::Text(_)) => true,
            (DataKind::Json, RuntimeData::Json(_)) => true,
            (DataKind::Vae, RuntimeData::Codec(_)) => true,
            _ => false,
        }
    }
}

/// Whether the host must connect an input
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
    /// Filled in by the host (workflow prompt, extra PNG info)
    Hidden,
}

/// A single input socket or widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: DataKind,
    pub requirement: Requirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Allowed values for combo widgets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default)]
    pub multiline: bool,
    /// Render as a socket rather than a widget
    #[serde(default)]
    pub force_input: bool,
}

impl InputSpec {
    fn with_requirement(name: impl Into<String>, kind: DataKind, requirement: Requirement) -> Self {
        Self {
            name: name.into(),
            kind,
            requirement,
            default: None,
            min: None,
            max: None,
            step: None,
            choices: Vec::new(),
            tooltip: None,
            multiline: false,
            force_input: false,
        }
    }

    pub fn required(name: impl Into<String>, kind: DataKind) -> Self {
        Self::with_requirement(name, kind, Requirement::Required)
    }

    pub fn optional(name: impl Into<String>, kind: DataKind) -> Self {
        Self::with_requirement(name, kind, Requirement::Optional)
    }

    pub fn hidden(name: impl Into<String>, kind: DataKind) -> Self {
        Self::with_requirement(name, kind, Requirement::Hidden)
    }

    pub fn default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Combo widget; the first choice becomes the default unless one is set
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        if self.default.is_none() {
            self.default = self.choices.first().cloned().map(serde_json::Value::String);
        }
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }
}

/// A single output socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub kind: DataKind,
}

/// Complete schema for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSchema {
    /// Node type identifier (e.g., "ImageFrameExtractor")
    pub node_type: String,

    /// Name shown in the host's node menu
    pub display_name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Category for grouping
    pub category: String,

    /// Entry point name reported to the host
    pub function: String,

    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Always executed, even when no output is consumed
    #[serde(default)]
    pub output_node: bool,

    /// Inputs arrive as lists of values
    #[serde(default)]
    pub input_is_list: bool,

    /// Construction parameter JSON Schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,
}

impl NodeSchema {
    /// Create a new node schema
    pub fn new(node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            display_name: node_type.clone(),
            node_type,
            description: None,
            category: CATEGORY.to_string(),
            function: "process".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            output_node: false,
            input_is_list: false,
            config_schema: None,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set description
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set category
    pub fn category(mut self, cat: impl Into<String>) -> Self {
        self.category = cat.into();
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, name: impl Into<String>, kind: DataKind) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn output_node(mut self) -> Self {
        self.output_node = true;
        self
    }

    pub fn input_is_list(mut self) -> Self {
        self.input_is_list = true;
        self
    }

    /// Set config schema from a type that implements schemars::JsonSchema
    ///
    /// # Example
    /// ```ignore
    /// #[derive(serde::Deserialize, schemars::JsonSchema, Default)]
    /// pub struct MyNodeConfig {
    ///     /// Poll interval in seconds
    ///     pub poll_interval_secs: f64,
    /// }
    ///
    /// NodeSchema::new("MyNode").config_schema_from::<MyNodeConfig>()
    /// ```
    pub fn config_schema_from<T: schemars::JsonSchema>(mut self) -> Self {
        let schema = schemars::schema_for!(T);
        self.config_schema = Some(serde_json::to_value(schema).unwrap_or_default());
        self
    }

    /// Look up an input by name
    pub fn get_input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Check required inputs are present, variants match, and numbers are in bounds
    pub fn validate_inputs(&self, inputs: &NodeInputs) -> Result<()> {
        for spec in &self.inputs {
            let Some(value) = inputs.get(&spec.name) else {
                if spec.requirement == Requirement::Required && spec.default.is_none() {
                    return Err(Error::invalid_input(&spec.name, "required input is missing"));
                }
                continue;
            };

            if !spec.kind.accepts(value) {
                return Err(Error::invalid_input(
                    &spec.name,
                    format!("expected {:?}, got {}", spec.kind, value.data_type()),
                ));
            }

            let number = match value {
                RuntimeData::Int(v) => Some(*v as f64),
                RuntimeData::Float(v) => Some(*v),
                _ => None,
            };
            if let Some(number) = number {
                if spec.min.is_some_and(|min| number < min) || spec.max.is_some_and(|max| number > max) {
                    return Err(Error::invalid_input(
                        &spec.name,
                        format!(
                            "{} is outside [{}, {}]",
                            number,
                            spec.min.unwrap_or(f64::NEG_INFINITY),
                            spec.max.unwrap_or(f64::INFINITY)
                        ),
                    ));
                }
            }

            if !spec.choices.is_empty() {
                if let RuntimeData::Text(text) = value {
                    if !spec.choices.iter().any(|choice| choice == text) {
                        return Err(Error::invalid_input(
                            &spec.name,
                            format!("\"{}\" is not one of {:?}", text, spec.choices),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Trait for types that provide their schema
pub trait HasNodeSchema {
    /// Get the schema for this node type
    fn schema() -> NodeSchema;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> NodeSchema {
        NodeSchema::new("Test")
            .input(InputSpec::required("images", DataKind::Image))
            .input(InputSpec::required("count", DataKind::Int).default(1).range(1.0, 10.0))
            .input(InputSpec::optional("mode", DataKind::String).choices(["a", "b"]))
            .output("images", DataKind::Image)
    }

    #[test]
    fn test_missing_required_input() {
        let err = schema().validate_inputs(&NodeInputs::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref input, .. } if input == "images"));
    }

    #[test]
    fn test_out_of_range_number() {
        let inputs = NodeInputs::new()
            .with("images", crate::data::ImageBatch::zeros(1, 2, 2, 3))
            .with("count", 11i64);
        assert!(schema().validate_inputs(&inputs).is_err());
    }

    #[test]
    fn test_unknown_choice() {
        let inputs = NodeInputs::new()
            .with("images", crate::data::ImageBatch::zeros(1, 2, 2, 3))
            .with("mode", "c");
        assert!(schema().validate_inputs(&inputs).is_err());
    }

    #[test]
    fn test_choices_default_to_first() {
        let s = schema();
        let mode = s.get_input("mode").unwrap();
        assert_eq!(mode.default, Some(serde_json::json!("a")));
    }

    #[test]
    fn test_any_kind_serializes_as_star() {
        let json = serde_json::to_value(DataKind::Any).unwrap();
        assert_eq!(json, serde_json::json!("*"));
    }
}
