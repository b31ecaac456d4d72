//! Chat templates shipped with HF model folders, rendered with minijinja

use crate::error::{Result, VlmNodeError};
use crate::tokenizer::TokenizerConfig;
use minijinja::{context, Environment, ErrorKind};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

const TEMPLATE_NAME: &str = "chat";

/// Files checked for a template, most specific first
pub const JINJA_TEMPLATE_FILE: &str = "chat_template.jinja";
pub const JSON_TEMPLATE_FILE: &str = "chat_template.json";

pub struct ChatTemplate {
    env: Environment<'static>,
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate").finish_non_exhaustive()
    }
}

impl ChatTemplate {
    /// Compile `source` with the HF rendering conventions
    pub fn new(source: String) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", |message: String| -> std::result::Result<String, minijinja::Error> {
            Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
        });
        env.add_template_owned(TEMPLATE_NAME, source)?;
        Ok(Self { env })
    }

    /// Locate and compile the template of a model folder
    pub fn from_dir(dir: &Path, tokenizer_config: &TokenizerConfig) -> Result<Self> {
        let jinja = dir.join(JINJA_TEMPLATE_FILE);
        if jinja.exists() {
            return Self::new(std::fs::read_to_string(jinja)?);
        }

        let json = dir.join(JSON_TEMPLATE_FILE);
        if json.exists() {
            let value: Value = serde_json::from_str(&std::fs::read_to_string(&json)?)
                .map_err(|e| VlmNodeError::Template(format!("invalid {}: {}", JSON_TEMPLATE_FILE, e)))?;
            if let Some(source) = value.get("chat_template").and_then(select_template) {
                return Self::new(source);
            }
        }

        tokenizer_config
            .chat_template
            .as_ref()
            .and_then(select_template)
            .ok_or_else(|| VlmNodeError::Template(format!("no chat template in {}", dir.display())))
            .and_then(Self::new)
    }

    /// Render `messages` into the prompt string
    pub fn render<M: Serialize>(
        &self,
        messages: &M,
        add_generation_prompt: bool,
        bos_token: Option<&str>,
        eos_token: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            messages => minijinja::Value::from_serialize(messages),
            add_generation_prompt => add_generation_prompt,
            bos_token => bos_token.unwrap_or_default(),
            eos_token => eos_token.unwrap_or_default(),
        })?;
        Ok(rendered)
    }
}

/// A template string, or the `default` entry (else the first) of a named list
fn select_template(value: &Value) -> Option<String> {
    match value {
        Value::String(source) => Some(source.clone()),
        Value::Array(entries) => entries
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some("default"))
            .or_else(|| entries.first())
            .and_then(|entry| entry.get("template"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Reduced Qwen-VL style template
    const QWEN_TEMPLATE: &str = concat!(
        "{% for message in messages %}",
        "<|im_start|>{{ message.role }}\n",
        "{% if message.content is string %}{{ message.content }}",
        "{% else %}{% for part in message.content %}",
        "{% if part.type == 'image' %}<|vision_start|><|image_pad|><|vision_end|>",
        "{% elif part.type == 'video' %}<|vision_start|><|video_pad|><|vision_end|>",
        "{% else %}{{ part.text.strip() }}{% endif %}",
        "{% endfor %}{% endif %}<|im_end|>\n",
        "{% endfor %}",
        "{% if add_generation_prompt %}<|im_start|>assistant\n{% endif %}",
    );

    fn messages() -> Value {
        json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": [{"type": "image"}, {"type": "text", "text": " what is this? "}]}
        ])
    }

    #[test]
    fn test_render_with_generation_prompt() {
        let template = ChatTemplate::new(QWEN_TEMPLATE.to_string()).unwrap();
        let prompt = template.render(&messages(), true, None, None).unwrap();
        assert_eq!(
            prompt,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\n<|vision_start|><|image_pad|><|vision_end|>what is this?<|im_end|>\n\
             <|im_start|>assistant\n"
        );

        let prompt = template.render(&messages(), false, None, None).unwrap();
        assert!(!prompt.ends_with("assistant\n"));
    }

    #[test]
    fn test_raise_exception_surfaces_as_error() {
        let template =
            ChatTemplate::new("{{ raise_exception('roles must alternate') }}".to_string()).unwrap();
        let err = template.render(&messages(), true, None, None).unwrap_err();
        assert!(err.to_string().contains("roles must alternate"));
    }

    #[test]
    fn test_template_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = TokenizerConfig {
            chat_template: Some(json!([
                {"name": "tool_use", "template": "tools"},
                {"name": "default", "template": "from-config"}
            ])),
            ..Default::default()
        };
        let render = |template: ChatTemplate| template.render(&json!([]), false, None, None).unwrap();

        assert_eq!(render(ChatTemplate::from_dir(dir.path(), &config).unwrap()), "from-config");

        std::fs::write(dir.path().join(JSON_TEMPLATE_FILE), r#"{"chat_template": "from-json"}"#).unwrap();
        assert_eq!(render(ChatTemplate::from_dir(dir.path(), &config).unwrap()), "from-json");

        std::fs::write(dir.path().join(JINJA_TEMPLATE_FILE), "from-jinja").unwrap();
        assert_eq!(render(ChatTemplate::from_dir(dir.path(), &config).unwrap()), "from-jinja");
    }

    #[test]
    fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChatTemplate::from_dir(dir.path(), &TokenizerConfig::default()).unwrap_err();
        assert!(matches!(err, VlmNodeError::Template(_)));
    }
}
