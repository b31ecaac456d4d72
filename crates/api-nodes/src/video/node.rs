//! Remote video-generation job node
//!
//! Submits a prompt (and optional reference frames), polls until the job
//! settles, downloads the MP4 into the output folder and decodes it. Any
//! failure becomes the node's error result rather than an `Err`, so the
//! graph keeps running and the message shows up in the UI. A downloaded
//! video that cannot be decoded still succeeds with placeholder frames.

use super::api::{GenerationRequest, HttpVideoApi, VideoApi, DEFAULT_BASE_URL};
use super::decode::{placeholder_frames, DecodedFrames, FfmpegDecoder, MediaDecoder};
use super::poll::{wait_for_video, PollPolicy};
use crate::config_store::ApiKeyStore;
use crate::data_url::png_data_urls;
use crate::error::{ApiNodeError, Result};
use async_trait::async_trait;
use ck_nodes_core::nodes::parse_params;
use ck_nodes_core::{
    AsyncNode, AsyncNodeWrapper, AudioWaveform, DataKind, InputSpec, Node, NodeContext,
    NodeFactory, NodeInputs, NodeOutput, NodeSchema, RuntimeData, UiFile, UiPayload,
};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const NODE_TYPE: &str = "CK_Googel_Veo3";

pub const MODELS: [&str; 10] = [
    "veo3",
    "veo3-fast",
    "veo3-pro",
    "veo3.1",
    "veo3.1-fast",
    "veo3.1-pro",
    "veo3.1-components",
    "veo3.1-4k",
    "veo3.1-pro-4k",
    "veo3.1-components-4k",
];
pub const DEFAULT_MODEL: &str = "veo3.1-fast";
pub const ASPECT_RATIOS: [&str; 2] = ["16:9", "9:16"];
const REFERENCE_INPUTS: [&str; 3] = ["image1", "image2", "image3"];

/// Factory parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VideoNodeConfig {
    /// Service root, without the `/v2/...` path
    pub base_url: String,
    pub poll_interval_secs: f64,
    pub max_poll_attempts: u32,
    pub submit_timeout_secs: u64,
}

impl Default for VideoNodeConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: policy.interval.as_secs_f64(),
            max_poll_attempts: policy.max_attempts,
            submit_timeout_secs: 300,
        }
    }
}

impl VideoNodeConfig {
    pub fn poll_policy(&self) -> ck_nodes_core::Result<PollPolicy> {
        let interval = Duration::try_from_secs_f64(self.poll_interval_secs).map_err(|e| {
            ck_nodes_core::Error::config(format!("poll_interval_secs: {}", e))
        })?;
        Ok(PollPolicy {
            interval,
            max_attempts: self.max_poll_attempts,
        })
    }
}

/// Successful job
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub task_id: String,
    pub video_url: String,
    /// File name inside the output folder
    pub filename: String,
    /// Copy in `save_path` when requested and successful, otherwise the output file
    pub local_path: PathBuf,
    pub frames: DecodedFrames,
    pub audio: Option<AudioWaveform>,
}

impl VideoJob {
    /// Summary emitted on the `response` output
    pub fn response_json(&self) -> String {
        json!({
            "task_id": self.task_id,
            "video_url": self.video_url,
            "local_path": self.local_path.to_string_lossy(),
            "fps": self.frames.fps,
        })
        .to_string()
    }

    fn into_output(self) -> NodeOutput {
        let response = self.response_json();
        let ui = UiPayload {
            videos: vec![UiFile::output(self.filename, "")],
            ..UiPayload::default()
        };
        NodeOutput::new(vec![
            RuntimeData::Image(self.frames.images),
            self.audio.map(RuntimeData::Audio).unwrap_or_default(),
            RuntimeData::Float(self.frames.fps),
            RuntimeData::Text(self.local_path.to_string_lossy().into_owned()),
            RuntimeData::Text(self.video_url),
            RuntimeData::Text(response),
        ])
        .with_ui(ui)
    }
}

/// Error result: placeholder frames, no audio, zero fps and the message
pub fn error_output(message: &str) -> NodeOutput {
    NodeOutput::new(vec![
        RuntimeData::Image(placeholder_frames()),
        RuntimeData::None,
        RuntimeData::Float(0.0),
        RuntimeData::Text(String::new()),
        RuntimeData::Text(String::new()),
        RuntimeData::Text(message.to_string()),
    ])
    .with_ui(UiPayload::text(message))
}

pub struct VideoGenerationNode {
    node_id: String,
    api: Arc<dyn VideoApi>,
    decoder: Arc<dyn MediaDecoder>,
    store: ApiKeyStore,
    api_key: Mutex<String>,
    output_dir: PathBuf,
    policy: PollPolicy,
}

impl VideoGenerationNode {
    /// The stored API key is read once, here
    pub fn new(
        node_id: impl Into<String>,
        api: Arc<dyn VideoApi>,
        decoder: Arc<dyn MediaDecoder>,
        store: ApiKeyStore,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let api_key = store.api_key().unwrap_or_default();
        Self {
            node_id: node_id.into(),
            api,
            decoder,
            store,
            api_key: Mutex::new(api_key),
            output_dir: output_dir.into(),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Key to use for this run; a non-blank `supplied` key replaces and persists the current one
    async fn resolve_api_key(&self, supplied: &str) -> Result<String> {
        if !supplied.trim().is_empty() {
            *self.api_key.lock() = supplied.to_string();
            if let Err(e) = self.store.save_api_key(supplied).await {
                tracing::warn!(node_id = %self.node_id, error = %e, "Failed to persist API key");
            }
        }
        let key = self.api_key.lock().clone();
        if key.is_empty() {
            return Err(ApiNodeError::MissingApiKey);
        }
        Ok(key)
    }

    fn build_request(inputs: &NodeInputs) -> Result<GenerationRequest> {
        let mut references = Vec::new();
        for name in REFERENCE_INPUTS {
            if let Some(batch) = inputs.opt_image(name)? {
                references.push(batch);
            }
        }

        let mut request = GenerationRequest::new(
            inputs.text_or("prompt", "")?,
            inputs.text_or("model", DEFAULT_MODEL)?,
        )
        .with_seed(inputs.int_or("seed", 0)?)
        .with_upsample(inputs.bool_or("enable_upsample", false)?);
        request.enhance_prompt = inputs.bool_or("enhance_prompt", false)?;
        request.aspect_ratio = inputs.text_or("aspect_ratio", ASPECT_RATIOS[0])?;
        request.images = png_data_urls(references)?;
        Ok(request)
    }

    /// Copy the download into `save_path`; failures keep the output-folder path
    async fn copy_to_save_path(&self, source: &Path, save_path: &str, filename: &str) -> PathBuf {
        let target_dir = PathBuf::from(save_path.trim());
        let target = target_dir.join(filename);
        let copied = async {
            tokio::fs::create_dir_all(&target_dir).await?;
            tokio::fs::copy(source, &target).await
        }
        .await;

        match copied {
            Ok(_) => target,
            Err(e) => {
                tracing::warn!(
                    node_id = %self.node_id,
                    path = %target.display(),
                    error = %e,
                    "Failed to copy video to custom path"
                );
                source.to_path_buf()
            }
        }
    }

    /// Run one generation job end to end
    pub async fn run(&self, inputs: &NodeInputs) -> Result<VideoJob> {
        let api_key = self.resolve_api_key(&inputs.text_or("apikey", "")?).await?;
        let request = Self::build_request(inputs)?;

        let task_id = self.api.submit(&api_key, &request).await?;
        tracing::info!(node_id = %self.node_id, task_id = %task_id, "Video generation submitted");

        let video_url = wait_for_video(self.api.as_ref(), &api_key, &task_id, self.policy).await?;

        let filename = format!("veo3_{}_{}.mp4", task_id, chrono::Utc::now().timestamp());
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ApiNodeError::Download(e.to_string()))?;
        let output_path = self.output_dir.join(&filename);
        self.api.download(&video_url, &output_path).await?;

        let save_path = inputs.text_or("save_path", "")?;
        let local_path = if save_path.trim().is_empty() {
            output_path.clone()
        } else {
            self.copy_to_save_path(&output_path, &save_path, &filename).await
        };

        let frames = match self.decoder.decode_frames(&output_path).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(
                    node_id = %self.node_id,
                    path = %output_path.display(),
                    error = %e,
                    "Video decode failed, returning placeholder frames"
                );
                DecodedFrames::placeholder()
            }
        };
        let audio = self.decoder.decode_audio(&output_path).await;

        Ok(VideoJob {
            task_id,
            video_url,
            filename,
            local_path,
            frames,
            audio,
        })
    }
}

#[async_trait]
impl AsyncNode for VideoGenerationNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn process(&self, inputs: NodeInputs) -> ck_nodes_core::Result<NodeOutput> {
        match self.run(&inputs).await {
            Ok(job) => Ok(job.into_output()),
            Err(e) => {
                let message = e.to_string();
                tracing::error!(node_id = %self.node_id, error = %message, "Video generation failed");
                Ok(error_output(&message))
            }
        }
    }
}

pub struct VideoGenerationNodeFactory {
    ctx: NodeContext,
}

impl VideoGenerationNodeFactory {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }
}

impl NodeFactory for VideoGenerationNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Google Veo3 (Plus) (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Generates a video with a remote Veo3 service and decodes it")
            .function("generate_video")
            .input(InputSpec::required("prompt", DataKind::String).multiline())
            .input(
                InputSpec::required("model", DataKind::String)
                    .choices(MODELS)
                    .default(DEFAULT_MODEL),
            )
            .input(InputSpec::required("enhance_prompt", DataKind::Boolean).default(false))
            .input(InputSpec::required("aspect_ratio", DataKind::String).choices(ASPECT_RATIOS))
            .input(InputSpec::optional("apikey", DataKind::String).default(""))
            .input(InputSpec::optional("image1", DataKind::Image))
            .input(InputSpec::optional("image2", DataKind::Image))
            .input(InputSpec::optional("image3", DataKind::Image))
            .input(
                InputSpec::optional("seed", DataKind::Int)
                    .default(0)
                    .range(0.0, 2_147_483_647.0),
            )
            .input(InputSpec::optional("enable_upsample", DataKind::Boolean).default(true))
            .input(
                InputSpec::optional("save_path", DataKind::String)
                    .default("")
                    .tooltip("Example: D:\\VeoVideos"),
            )
            .output("images", DataKind::Image)
            .output("audio", DataKind::Audio)
            .output("fps", DataKind::Float)
            .output("video_path", DataKind::String)
            .output("video_url", DataKind::String)
            .output("response", DataKind::String)
            .output_node()
            .config_schema_from::<VideoNodeConfig>()
    }

    fn create(&self, node_id: String, params: &Value) -> ck_nodes_core::Result<Box<dyn Node>> {
        let config: VideoNodeConfig = parse_params(params)?;
        let host = &self.ctx.host;

        let api = HttpVideoApi::new(config.base_url.clone(), Arc::clone(&self.ctx.network))
            .with_submit_timeout(Duration::from_secs(config.submit_timeout_secs));
        let decoder = FfmpegDecoder::new();

        let node = VideoGenerationNode::new(
            node_id,
            Arc::new(api),
            Arc::new(decoder),
            ApiKeyStore::new(&host.config_dir),
            host.output_dir.clone(),
        )
        .with_poll_policy(config.poll_policy()?);

        Ok(Box::new(AsyncNodeWrapper(Arc::new(node))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_output_shape() {
        let output = error_output("Generation timeout");
        assert_eq!(output.len(), 6);
        assert_eq!(output.get(0).as_image().unwrap().data().dim(), (1, 64, 64, 3));
        assert!(output.get(1).is_none());
        assert!(matches!(output.get(2), RuntimeData::Float(f) if *f == 0.0));
        assert_eq!(output.get(5).as_text(), Some("Generation timeout"));
        assert_eq!(output.ui.unwrap().text, vec!["Generation timeout".to_string()]);
    }

    #[test]
    fn test_config_poll_policy() {
        let config = VideoNodeConfig::default();
        assert_eq!(config.poll_policy().unwrap(), PollPolicy::default());

        let config = VideoNodeConfig {
            poll_interval_secs: -1.0,
            ..VideoNodeConfig::default()
        };
        assert!(config.poll_policy().is_err());
    }

    #[test]
    fn test_schema_outputs() {
        let schema = VideoGenerationNodeFactory::new(NodeContext::default()).schema();
        let names: Vec<&str> = schema.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            ["images", "audio", "fps", "video_path", "video_url", "response"]
        );
        assert!(schema.output_node);
        let model = schema.get_input("model").unwrap();
        assert_eq!(model.default, Some(Value::from(DEFAULT_MODEL)));
        assert_eq!(model.choices.len(), 10);
    }
}
