//! Video generation node against scripted API and decoder implementations

use async_trait::async_trait;
use ck_nodes_api::video::{
    DecodedFrames, GenerationRequest, MediaDecoder, TaskStatus, VideoApi, VideoGenerationNode,
};
use ck_nodes_api::{ApiKeyStore, ApiNodeError};
use ck_nodes_core::{AsyncNode, AudioWaveform, ImageBatch, NodeInputs, NodeOutput, RuntimeData};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Errors for the first `errors_first` queries, pending until query
/// `pending`, then `outcome` (pending forever when `None`)
struct ScriptedApi {
    task_id: Option<String>,
    errors_first: u32,
    pending: u32,
    outcome: Option<TaskStatus>,
    submits: Mutex<Vec<(String, GenerationRequest)>>,
    status_calls: AtomicU32,
}

impl ScriptedApi {
    fn new(task_id: Option<&str>, pending: u32, outcome: Option<TaskStatus>) -> Self {
        Self {
            task_id: task_id.map(str::to_string),
            errors_first: 0,
            pending,
            outcome,
            submits: Mutex::new(Vec::new()),
            status_calls: AtomicU32::new(0),
        }
    }

    fn succeeding_after(pending: u32) -> Self {
        Self::new(
            Some("task-1"),
            pending,
            Some(TaskStatus::Succeeded {
                video_url: "https://cdn.example/video.mp4".into(),
            }),
        )
    }

    fn with_errors_first(mut self, errors_first: u32) -> Self {
        self.errors_first = errors_first;
        self
    }

    fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoApi for ScriptedApi {
    async fn submit(&self, api_key: &str, request: &GenerationRequest) -> ck_nodes_api::Result<String> {
        self.submits.lock().push((api_key.to_string(), request.clone()));
        self.task_id.clone().ok_or(ApiNodeError::NoTaskId)
    }

    async fn status(&self, _api_key: &str, _task_id: &str) -> ck_nodes_api::Result<TaskStatus> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.errors_first {
            return Err(ApiNodeError::Request("connection reset by peer".into()));
        }
        match &self.outcome {
            Some(outcome) if call > self.pending => Ok(outcome.clone()),
            _ => Ok(TaskStatus::Pending("SUBMITTED".into())),
        }
    }

    async fn download(&self, _url: &str, dest: &Path) -> ck_nodes_api::Result<u64> {
        tokio::fs::write(dest, b"mp4").await?;
        Ok(3)
    }
}

struct FixedDecoder;

#[async_trait]
impl MediaDecoder for FixedDecoder {
    async fn decode_frames(&self, _path: &Path) -> ck_nodes_api::Result<DecodedFrames> {
        Ok(DecodedFrames {
            images: ImageBatch::zeros(2, 4, 4, 3),
            fps: 30.0,
        })
    }

    async fn decode_audio(&self, _path: &Path) -> Option<AudioWaveform> {
        Some(AudioWaveform::from_interleaved(&[0.0; 8], 2, 48_000))
    }
}

/// Decoder that cannot open anything
struct BrokenDecoder;

#[async_trait]
impl MediaDecoder for BrokenDecoder {
    async fn decode_frames(&self, _path: &Path) -> ck_nodes_api::Result<DecodedFrames> {
        Err(ApiNodeError::decode("cannot open container: invalid data"))
    }

    async fn decode_audio(&self, _path: &Path) -> Option<AudioWaveform> {
        None
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    output_dir: PathBuf,
    store: ApiKeyStore,
}

async fn fixture(stored_key: Option<&str>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("output");
    let store = ApiKeyStore::new(dir.path());
    if let Some(key) = stored_key {
        store.save_api_key(key).await.unwrap();
    }
    Fixture {
        output_dir,
        store,
        _dir: dir,
    }
}

fn node(fixture: &Fixture, api: Arc<ScriptedApi>) -> VideoGenerationNode {
    node_with_decoder(fixture, api, Arc::new(FixedDecoder))
}

fn node_with_decoder(
    fixture: &Fixture,
    api: Arc<ScriptedApi>,
    decoder: Arc<dyn MediaDecoder>,
) -> VideoGenerationNode {
    VideoGenerationNode::new(
        "veo",
        api,
        decoder,
        fixture.store.clone(),
        fixture.output_dir.clone(),
    )
}

fn prompt_inputs() -> NodeInputs {
    NodeInputs::new()
        .with("prompt", "a cat surfing")
        .with("model", "veo3.1-fast")
        .with("enhance_prompt", false)
        .with("aspect_ratio", "16:9")
}

fn message(output: &NodeOutput) -> &str {
    output.get(5).as_text().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_success_on_last_poll_attempt() {
    let fixture = fixture(Some("sk-stored")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(149));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(api.status_calls(), 150);
    assert_eq!(output.len(), 6);
    assert_eq!(output.get(0).as_image().unwrap().len(), 2);
    assert!(matches!(output.get(1), RuntimeData::Audio(a) if a.channels() == 2));
    assert!(matches!(output.get(2), RuntimeData::Float(fps) if *fps == 30.0));
    assert_eq!(output.get(4).as_text(), Some("https://cdn.example/video.mp4"));

    let video_path = PathBuf::from(output.get(3).as_text().unwrap());
    assert!(video_path.starts_with(&fixture.output_dir));
    assert!(video_path.exists());
    let filename = video_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(filename.starts_with("veo3_task-1_") && filename.ends_with(".mp4"));

    let response: serde_json::Value = serde_json::from_str(message(&output)).unwrap();
    assert_eq!(response["task_id"], "task-1");
    assert_eq!(response["fps"], 30.0);

    let ui = output.ui.unwrap();
    assert_eq!(ui.videos.len(), 1);
    assert_eq!(ui.videos[0].filename, filename);
    assert_eq!(ui.videos[0].subfolder, "");
    assert_eq!(ui.videos[0].kind, "output");

    let submits = api.submits.lock();
    assert_eq!(submits[0].0, "sk-stored");
    assert_eq!(submits[0].1.seed, None);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_poll_budget() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::new(Some("task-2"), 0, None));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(message(&output), "Generation timeout");
    assert_eq!(api.status_calls(), 150);
    assert_eq!(output.get(0).as_image().unwrap().data().dim(), (1, 64, 64, 3));
    assert!(output.get(1).is_none());
    assert_eq!(output.get(3).as_text(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn test_missing_task_id_is_error_result() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::new(None, 0, None));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(message(&output), "No task_id returned");
    assert_eq!(output.ui.unwrap().text, vec!["No task_id returned".to_string()]);
    assert_eq!(api.status_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_reason() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::new(
        Some("task-3"),
        2,
        Some(TaskStatus::Failed {
            reason: "content policy".into(),
        }),
    ));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(message(&output), "content policy");
    assert_eq!(api.status_calls(), 3);
}

#[tokio::test]
async fn test_missing_api_key() {
    let fixture = fixture(None).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(message(&output), "API Key missing");
    assert!(api.submits.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_supplied_key_is_persisted_and_used() {
    let fixture = fixture(Some("sk-old")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    let node = node(&fixture, api.clone());

    let inputs = prompt_inputs().with("apikey", "sk-new");
    node.process(inputs).await.unwrap();
    assert_eq!(fixture.store.api_key().as_deref(), Some("sk-new"));

    // blank input keeps the key set by the previous run
    node.process(prompt_inputs().with("apikey", "  ")).await.unwrap();
    let submits = api.submits.lock();
    assert_eq!(submits[0].0, "sk-new");
    assert_eq!(submits[1].0, "sk-new");
}

#[tokio::test(start_paused = true)]
async fn test_request_carries_reference_frames_and_options() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    let inputs = prompt_inputs()
        .with("image1", ImageBatch::zeros(2, 8, 8, 3))
        .with("image3", ImageBatch::zeros(1, 8, 8, 3))
        .with("seed", 7i64)
        .with("enable_upsample", true)
        .with("aspect_ratio", "9:16");
    node(&fixture, api.clone()).process(inputs).await.unwrap();

    let submits = api.submits.lock();
    let request = &submits[0].1;
    assert_eq!(request.images.len(), 3);
    assert!(request.images[0].starts_with("data:image/png;base64,"));
    assert_eq!(request.seed, Some(7));
    assert_eq!(request.enable_upsample, Some(true));
    assert_eq!(request.aspect_ratio, "9:16");
}

#[tokio::test(start_paused = true)]
async fn test_save_path_copy_becomes_video_path() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    let save_dir = fixture.output_dir.parent().unwrap().join("mine");
    let inputs = prompt_inputs().with("save_path", save_dir.to_string_lossy().into_owned());
    let output = node(&fixture, api).process(inputs).await.unwrap();

    let video_path = PathBuf::from(output.get(3).as_text().unwrap());
    assert!(video_path.starts_with(&save_dir));
    assert!(video_path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_status_errors_count_as_attempts() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(2).with_errors_first(2));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    // two failed queries, then success on the third
    assert_eq!(api.status_calls(), 3);
    assert_eq!(output.get(4).as_text(), Some("https://cdn.example/video.mp4"));
}

#[tokio::test(start_paused = true)]
async fn test_status_errors_exhaust_poll_budget() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0).with_errors_first(u32::MAX));
    let output = node(&fixture, api.clone()).process(prompt_inputs()).await.unwrap();

    assert_eq!(api.status_calls(), 150);
    assert_eq!(message(&output), "Generation timeout");
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_path_copy_keeps_output_path() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    // a regular file where the save directory's parent should be
    let blocker = fixture.output_dir.parent().unwrap().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();
    let save_dir = blocker.join("videos");

    let inputs = prompt_inputs().with("save_path", save_dir.to_string_lossy().into_owned());
    let output = node(&fixture, api).process(inputs).await.unwrap();

    let video_path = PathBuf::from(output.get(3).as_text().unwrap());
    assert!(video_path.starts_with(&fixture.output_dir), "{}", video_path.display());
    assert!(video_path.exists());
    let response: serde_json::Value = serde_json::from_str(message(&output)).unwrap();
    assert_eq!(response["local_path"], video_path.to_string_lossy().as_ref());
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_video_returns_placeholder_frames() {
    let fixture = fixture(Some("sk")).await;
    let api = Arc::new(ScriptedApi::succeeding_after(0));
    let output = node_with_decoder(&fixture, api, Arc::new(BrokenDecoder))
        .process(prompt_inputs())
        .await
        .unwrap();

    assert_eq!(output.get(0).as_image().unwrap().data().dim(), (1, 64, 64, 3));
    assert!(output.get(1).is_none());
    assert!(matches!(output.get(2), RuntimeData::Float(fps) if *fps == 24.0));
    assert_eq!(output.get(4).as_text(), Some("https://cdn.example/video.mp4"));
    let video_path = PathBuf::from(output.get(3).as_text().unwrap());
    assert!(video_path.exists());
}
