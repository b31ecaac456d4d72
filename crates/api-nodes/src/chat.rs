//! OpenAI-compatible chat-completion node
//!
//! Sends one system + user exchange (optionally with images) and returns
//! the reply text. Every failure is reported as text in the output instead
//! of failing the graph.

use crate::data_url::{jpeg_data_url, JPEG_QUALITY};
use async_trait::async_trait;
use ck_nodes_core::nodes::parse_params;
use ck_nodes_core::{
    AsyncNode, AsyncNodeWrapper, DataKind, ImageBatch, InputSpec, Node, NodeFactory, NodeInputs,
    NodeOutput, NodeSchema, Result, SharedNetworkConfig,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const NODE_TYPE: &str = "SimpleOpenAI_LLM";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
pub const USER_AGENT: &str = "ComfyUI_Client/1.0";
pub const MAX_SEED: i64 = 2_147_483_647;

/// Resolve the chat-completions endpoint from a base URL or a full endpoint
pub fn normalize_endpoint(api_url: &str) -> String {
    let url = api_url.trim();
    let url = url.strip_suffix('/').unwrap_or(url);
    if url.ends_with(CHAT_COMPLETIONS_PATH) {
        url.to_string()
    } else {
        format!("{}{}", url, CHAT_COMPLETIONS_PATH)
    }
}

/// One chat-completion call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub seed: i64,
    /// Image data URLs attached to the user message
    pub images: Vec<String>,
}

/// JSON body for `request`
pub fn build_payload(request: &ChatRequest) -> Value {
    let mut content = vec![json!({"type": "text", "text": request.user_prompt})];
    content.extend(request.images.iter().map(|url| {
        json!({"type": "image_url", "image_url": {"url": url, "detail": "auto"}})
    }));

    json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": content},
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "stream": false,
        "seed": request.seed.rem_euclid(MAX_SEED),
    })
}

/// Reply text from a successful response body
pub fn extract_reply(body: &str) -> String {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => {
            return format!("API Error: Response is not JSON. Raw content:\n{}", body);
        }
    };

    if let Some(choice) = json.get("choices").and_then(|c| c.get(0)) {
        for key in ["message", "delta"] {
            if let Some(message) = choice.get(key) {
                return message
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
            }
        }
    }
    format!("API Response (Unparsed): {}", json)
}

/// HTTP client for chat completions
///
/// A fresh `reqwest::Client` is built per call from the shared network
/// configuration so proxy changes apply immediately.
pub struct ChatCompletionClient {
    network: SharedNetworkConfig,
    timeout: Option<Duration>,
}

impl ChatCompletionClient {
    pub fn new(network: SharedNetworkConfig, timeout: Option<Duration>) -> Self {
        Self { network, timeout }
    }

    /// Run `request`, returning the reply or a readable error message
    pub async fn complete(&self, request: &ChatRequest) -> String {
        let endpoint = normalize_endpoint(&request.api_url);
        let client = match self.network.read().http_client(self.timeout) {
            Ok(client) => client,
            Err(e) => return format!("Connection Error: {}", e),
        };

        tracing::info!(
            endpoint = %endpoint,
            model = %request.model,
            images = request.images.len(),
            "Sending chat completion request"
        );

        let response = client
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .bearer_auth(&request.api_key)
            .json(&build_payload(request))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return format!("Connection Error: {}", e),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return format!("Connection Error: {}", e),
        };

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Chat completion request rejected");
            return format!("HTTP Error {}: {}", status.as_u16(), body);
        }
        extract_reply(&body)
    }
}

/// Factory parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ChatNodeConfig {
    /// Request timeout in seconds; none waits indefinitely
    pub timeout_secs: Option<u64>,
}

pub struct SimpleLlmNode {
    client: ChatCompletionClient,
}

impl SimpleLlmNode {
    pub fn new(client: ChatCompletionClient) -> Self {
        Self { client }
    }

    fn request_from_inputs(inputs: &NodeInputs) -> Result<ChatRequest> {
        let images = match inputs.opt_image("images")? {
            Some(batch) => encode_images(batch)?,
            None => Vec::new(),
        };
        Ok(ChatRequest {
            api_url: inputs.text_or("api_url", DEFAULT_API_URL)?,
            api_key: inputs.text_or("api_key", "")?,
            model: inputs.text_or("model_name", "gpt-4o")?,
            system_prompt: inputs.text_or("system_prompt", "You are a helpful assistant.")?,
            user_prompt: inputs.text_or("user_prompt", "Describe this image in detail.")?,
            temperature: inputs.float_or("temperature", 0.7)?,
            max_tokens: inputs.int_or("max_tokens", 2048)?,
            seed: inputs.int_or("seed", 0)?,
            images,
        })
    }
}

fn encode_images(batch: &ImageBatch) -> Result<Vec<String>> {
    (0..batch.len())
        .map(|index| jpeg_data_url(batch, index, JPEG_QUALITY))
        .collect()
}

#[async_trait]
impl AsyncNode for SimpleLlmNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let request = Self::request_from_inputs(&inputs)?;
        let reply = self.client.complete(&request).await;
        Ok(NodeOutput::single(reply))
    }
}

pub struct SimpleLlmNodeFactory {
    network: SharedNetworkConfig,
}

impl SimpleLlmNodeFactory {
    pub fn new(network: SharedNetworkConfig) -> Self {
        Self { network }
    }
}

impl NodeFactory for SimpleLlmNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Simple LLM Assistant (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Chat completion against any OpenAI-compatible endpoint")
            .category("CKNodes/LLM")
            .function("generate_completion")
            .input(InputSpec::required("api_url", DataKind::String).default(DEFAULT_API_URL))
            .input(InputSpec::required("api_key", DataKind::String).default("sk-..."))
            .input(InputSpec::required("model_name", DataKind::String).default("gpt-4o"))
            .input(
                InputSpec::required("system_prompt", DataKind::String)
                    .default("You are a helpful assistant.")
                    .multiline(),
            )
            .input(
                InputSpec::required("user_prompt", DataKind::String)
                    .default("Describe this image in detail.")
                    .multiline(),
            )
            .input(
                InputSpec::required("temperature", DataKind::Float)
                    .default(0.7)
                    .range(0.0, 2.0)
                    .step(0.1),
            )
            .input(
                InputSpec::required("max_tokens", DataKind::Int)
                    .default(2048)
                    .range(1.0, 128000.0),
            )
            .input(
                InputSpec::required("seed", DataKind::Int)
                    .default(0)
                    .range(0.0, MAX_SEED as f64),
            )
            .input(InputSpec::optional("images", DataKind::Image))
            .output("response_text", DataKind::String)
            .config_schema_from::<ChatNodeConfig>()
    }

    fn create(&self, node_id: String, params: &Value) -> Result<Box<dyn Node>> {
        let config: ChatNodeConfig = parse_params(params)?;
        tracing::debug!(node_id = %node_id, ?config, "Creating chat completion node");
        let client = ChatCompletionClient::new(
            Arc::clone(&self.network),
            config.timeout_secs.map(Duration::from_secs),
        );
        Ok(Box::new(AsyncNodeWrapper(Arc::new(SimpleLlmNode::new(client)))))
    }
}
