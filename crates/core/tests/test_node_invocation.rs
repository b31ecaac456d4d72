//! End-to-end invocations through the registry

use ck_nodes_core::{
    register_core_nodes, HostConfig, ImageBatch, NetworkConfig, NodeContext, NodeInputs,
    NodeRegistry, NodeRegistryBuilder, RuntimeData,
};
use ndarray::Array4;
use serde_json::Value;

fn registry(ctx: &NodeContext) -> NodeRegistry {
    let mut builder = NodeRegistryBuilder::new();
    register_core_nodes(&mut builder, ctx);
    builder.build()
}

fn numbered_frames(frames: usize) -> ImageBatch {
    ImageBatch::new(Array4::from_shape_fn((frames, 2, 2, 3), |(b, _, _, _)| b as f32 / 100.0)).unwrap()
}

#[tokio::test]
async fn test_extract_frames_windows() {
    let registry = registry(&NodeContext::default());
    let node = registry
        .create_node("ExtractFramesFromBatch", "extract".into(), &Value::Null)
        .unwrap();

    for (direction, expected_len, expected_first) in [("forward", 5, 4.0), ("backward", 2, 8.0)] {
        let inputs = NodeInputs::new()
            .with("image", numbered_frames(10))
            .with("start_index", 8i64)
            .with("direction", direction)
            .with("frame_count", 5i64);
        let output = node.process(inputs).await.unwrap();
        let images = output.get(0).as_image().unwrap();
        assert_eq!(images.len(), expected_len, "{}", direction);
        assert!((images.data()[[0, 0, 0, 0]] * 100.0 - expected_first).abs() < 1e-4);
    }
}

#[tokio::test]
async fn test_concatenate_through_registry() {
    let registry = registry(&NodeContext::default());
    let node = registry
        .create_node("Text_Concatenate", "concat".into(), &Value::Null)
        .unwrap();

    let inputs = NodeInputs::new()
        .with("delimiter", ", ")
        .with("clean_whitespace", "true")
        .with("text_a", "  a  ")
        .with("text_b", "")
        .with("text_c", "b");
    let output = node.process(inputs).await.unwrap();
    assert_eq!(output.get(0).as_text(), Some("a, b"));
}

#[tokio::test]
async fn test_settings_visible_to_later_nodes() {
    let ctx = NodeContext::new(HostConfig::default(), NetworkConfig::default());
    let registry = registry(&ctx);

    let settings = registry
        .create_node("TemporaryNetSettings", "settings".into(), &Value::Null)
        .unwrap();
    settings
        .process(
            NodeInputs::new()
                .with("any_input", RuntimeData::None)
                .with("huggingface_mirror", "https://hf-mirror.com"),
        )
        .await
        .unwrap();

    let debug = registry
        .create_node("NetDebugNodeAny", "debug".into(), &Value::Null)
        .unwrap();
    let output = debug
        .process(NodeInputs::new().with("any_input", 1i64))
        .await
        .unwrap();
    let report = &output.ui.unwrap().text[0];
    assert!(report.contains("HF mirror: https://hf-mirror.com"));
    assert_eq!(ctx.network.read().hf_endpoint.as_deref(), Some("https://hf-mirror.com"));
}

#[tokio::test]
async fn test_save_image_under_host_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let host = HostConfig {
        output_dir: dir.path().to_path_buf(),
        ..HostConfig::default()
    };
    let registry = registry(&NodeContext::new(host, NetworkConfig::default()));
    let node = registry.create_node("SaveImageCK", "save".into(), &Value::Null).unwrap();

    let inputs = NodeInputs::new()
        .with("images", ImageBatch::zeros(1, 8, 8, 3))
        .with("filename_prefix", "batch/shot")
        .with("output_folder", "renders")
        .with("caption", "a cat")
        .with("encoding", "gbk");
    let output = node.process(inputs).await.unwrap();

    assert_eq!(output.get(0).as_text(), Some("shot_00001_.png"));
    let folder = dir.path().join("renders").join("batch");
    assert!(folder.join("shot_00001_.png").is_file());
    assert_eq!(std::fs::read(folder.join("shot_00001_.txt")).unwrap(), b"a cat");
    assert_eq!(output.ui.unwrap().images[0].subfolder, "batch");
}
