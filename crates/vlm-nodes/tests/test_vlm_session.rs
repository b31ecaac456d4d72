//! Vision-language node lifecycle against a scripted backend

use ck_nodes_core::{
    HostConfig, ImageBatch, NetworkConfig, NodeContext, NodeFactory, NodeInputs, NodeRegistryBuilder,
};
use ck_nodes_vlm::config::Decoding;
use ck_nodes_vlm::{
    register_vlm_nodes, AttentionImpl, BackendCapabilities, GenerationParams, LoadRequest, ModelCatalog,
    ModelInputs, QwenVlNodeFactory, VisionLanguageLoader, VisionLanguageModel, VlmNodeError,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

const TOKENIZER_JSON: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 5, "content": "<|im_end|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 6, "content": "<|eot_id|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
    ],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {"[UNK]": 0, "hello": 1, "world": 2, "user": 3, "assistant": 4, "<|im_end|>": 5, "<|eot_id|>": 6},
        "unk_token": "[UNK]"
    }
}"#;

const TEMPLATE: &str = "{% for m in messages %}{{ m.role }}: \
{% if m.content is string %}{{ m.content }}{% else %}{% for p in m.content %}\
{% if p.type == 'text' %}{{ p.text }}{% else %}[{{ p.type }}] {% endif %}{% endfor %}{% endif %}\
<|im_end|>\n{% endfor %}{% if add_generation_prompt %}assistant: {% endif %}";

const MODEL: &str = "Qwen3-VL-Test";

#[derive(Default)]
struct Recorded {
    loads: Vec<LoadRequest>,
    inputs: Vec<ModelInputs>,
    params: Vec<GenerationParams>,
}

struct ScriptedLoader {
    caps: BackendCapabilities,
    fail: bool,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedLoader {
    fn new(caps: BackendCapabilities) -> Self {
        Self {
            caps,
            fail: false,
            recorded: Arc::new(Mutex::new(Recorded::default())),
        }
    }
}

struct ScriptedModel {
    recorded: Arc<Mutex<Recorded>>,
}

impl VisionLanguageModel for ScriptedModel {
    fn generate(&mut self, inputs: &ModelInputs, params: &GenerationParams) -> ck_nodes_vlm::Result<Vec<u32>> {
        let mut recorded = self.recorded.lock();
        recorded.inputs.push(inputs.clone());
        recorded.params.push(params.clone());
        // echo the prompt, then "hello world" and end of turn
        let mut output = inputs.input_ids.clone();
        output.extend([1, 2, 5]);
        Ok(output)
    }
}

impl VisionLanguageLoader for ScriptedLoader {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    fn load(&self, request: &LoadRequest) -> ck_nodes_vlm::Result<Box<dyn VisionLanguageModel>> {
        self.recorded.lock().loads.push(request.clone());
        if self.fail {
            return Err(VlmNodeError::tokenizer("weights are corrupt"));
        }
        Ok(Box::new(ScriptedModel {
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

fn install_model(models_dir: &Path) {
    let dir = models_dir.join("prompt_generator").join(MODEL);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.json"), "{}").unwrap();
    std::fs::write(dir.join("tokenizer.json"), TOKENIZER_JSON).unwrap();
    std::fs::write(dir.join("tokenizer_config.json"), r#"{"eos_token": "<|im_end|>"}"#).unwrap();
    std::fs::write(dir.join("chat_template.jinja"), TEMPLATE).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    catalog: ModelCatalog,
    ctx: NodeContext,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let models_dir = dir.path().join("models");
    install_model(&models_dir);
    let host = HostConfig {
        models_dir,
        ..HostConfig::default()
    };
    Fixture {
        catalog: ModelCatalog::new(host.prompt_generator_paths()),
        ctx: NodeContext::new(host, NetworkConfig::default()),
        _dir: dir,
    }
}

fn inputs() -> NodeInputs {
    NodeInputs::new()
        .with("model_name", MODEL)
        .with("system_prompt", "Be brief.")
        .with("user_prompt", "What is shown?")
        .with("seed", 42i64)
}

#[tokio::test]
async fn test_generates_and_reuses_loaded_model() -> anyhow::Result<()> {
    let fx = fixture();
    let loader = Arc::new(ScriptedLoader::new(BackendCapabilities::default()));
    let factory = QwenVlNodeFactory::new(fx.catalog.clone(), loader.clone());
    let node = factory.create("vlm".into(), &serde_json::Value::Null)?;

    let output = node.process(inputs()).await?;
    assert_eq!(output.get(0).as_text(), Some("hello world"));
    node.process(inputs()).await?;

    let recorded = loader.recorded.lock();
    assert_eq!(recorded.loads.len(), 1);
    assert_eq!(recorded.loads[0].attention, AttentionImpl::Sdpa);
    assert_eq!(recorded.loads[0].model_path.file_name().unwrap(), MODEL);

    let params = &recorded.params[0];
    assert_eq!(params.stop_token_ids, vec![5, 6]);
    assert_eq!(params.seed, 42);
    assert_eq!(params.max_new_tokens, 512);
    assert!(matches!(params.decoding(), Decoding::Sample { .. }));
    Ok(())
}

#[tokio::test]
async fn test_signature_change_reloads() -> anyhow::Result<()> {
    let fx = fixture();
    let loader = Arc::new(ScriptedLoader::new(BackendCapabilities {
        cuda_devices: 1,
        metal: false,
        flash_attention: true,
    }));
    let node = QwenVlNodeFactory::new(fx.catalog.clone(), loader.clone())
        .create("vlm".into(), &serde_json::Value::Null)?;

    node.process(inputs()).await?;
    node.process(inputs().with("quantization", "4-bit (VRAM-friendly)")).await?;
    node.process(inputs().with("quantization", "4-bit (VRAM-friendly)")).await?;
    node.process(inputs().with("quantization", "4-bit (VRAM-friendly)").with("attention_mode", "sdpa"))
        .await?;

    let recorded = loader.recorded.lock();
    let attentions: Vec<AttentionImpl> = recorded.loads.iter().map(|l| l.attention).collect();
    assert_eq!(
        attentions,
        vec![AttentionImpl::FlashAttention2, AttentionImpl::FlashAttention2, AttentionImpl::Sdpa]
    );
    Ok(())
}

#[tokio::test]
async fn test_unload_when_not_kept() -> anyhow::Result<()> {
    let fx = fixture();
    let loader = Arc::new(ScriptedLoader::new(BackendCapabilities::default()));
    let node = QwenVlNodeFactory::new(fx.catalog.clone(), loader.clone())
        .create("vlm".into(), &serde_json::Value::Null)?;

    let transient = || inputs().with("keep_model_loaded", false);
    node.process(transient()).await?;
    node.process(transient()).await?;
    assert_eq!(loader.recorded.lock().loads.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_media_reaches_backend() -> anyhow::Result<()> {
    let fx = fixture();
    let loader = Arc::new(ScriptedLoader::new(BackendCapabilities::default()));
    let node = QwenVlNodeFactory::new(fx.catalog.clone(), loader.clone())
        .create("vlm".into(), &serde_json::json!({"frame_count": 8, "num_beams": 3}))?;

    let media = inputs()
        .with("image", ImageBatch::zeros(4, 8, 8, 3))
        .with("video", ImageBatch::zeros(30, 8, 8, 3));
    node.process(media).await?;

    let recorded = loader.recorded.lock();
    let sent = &recorded.inputs[0];
    assert_eq!(sent.images.len(), 1);
    assert_eq!(sent.images[0].len(), 1);
    assert_eq!(sent.video.as_ref().map(ImageBatch::len), Some(8));
    assert_eq!(recorded.params[0].decoding(), Decoding::Beam { num_beams: 3 });
    Ok(())
}

#[tokio::test]
async fn test_missing_model_and_failed_load() -> anyhow::Result<()> {
    let fx = fixture();
    let loader = Arc::new(ScriptedLoader::new(BackendCapabilities::default()));
    let node = QwenVlNodeFactory::new(fx.catalog.clone(), loader.clone())
        .create("vlm".into(), &serde_json::Value::Null)?;
    let err = node
        .process(inputs().with("model_name", "ghost"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Model 'ghost' not found in prompt_generator paths."));

    let failing = Arc::new(ScriptedLoader {
        fail: true,
        ..ScriptedLoader::new(BackendCapabilities::default())
    });
    let node = QwenVlNodeFactory::new(fx.catalog.clone(), failing)
        .create("vlm".into(), &serde_json::Value::Null)?;
    let err = node.process(inputs()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Failed to load model 'Qwen3-VL-Test'"), "{}", message);
    assert!(message.contains("weights are corrupt"), "{}", message);
    Ok(())
}

#[tokio::test]
async fn test_registered_without_backend() -> anyhow::Result<()> {
    let fx = fixture();
    let mut builder = NodeRegistryBuilder::new();
    register_vlm_nodes(&mut builder, &fx.ctx, None);
    let registry = builder.build();

    let schema = registry.schema("QwenVL_Local_Loader").unwrap();
    let model = schema.get_input("model_name").unwrap();
    assert_eq!(model.choices, vec![MODEL.to_string()]);

    let node = registry.create_node("QwenVL_Local_Loader", "vlm".into(), &serde_json::Value::Null)?;
    let err = node.process(inputs()).await.unwrap_err();
    // the fixture folder has no weights, so the candle backend fails too
    #[cfg(feature = "candle")]
    assert!(err.to_string().contains("Failed to load model"), "{}", err);
    #[cfg(not(feature = "candle"))]
    assert!(err.to_string().contains("no vision-language inference backend"));
    Ok(())
}
