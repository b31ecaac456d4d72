//! Frame extraction from image batches

use crate::data::{ImageBatch, NodeInputs, NodeOutput};
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::Result;
use serde_json::Value;
use std::ops::Range;

pub const NODE_TYPE: &str = "ExtractFramesFromBatch";

/// Upper bound of the index and count widgets
pub const MAX_FRAMES: i64 = 8192;

/// Which side of `start_index` the window extends to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Window ends at `start_index` (inclusive) and extends towards index 0
    Forward,
    /// Window starts at `start_index` and extends towards the end
    Backward,
}

impl Direction {
    /// `"backward"` selects [`Direction::Backward`]; anything else is forward
    pub fn from_name(name: &str) -> Self {
        match name {
            "backward" => Direction::Backward,
            "forward" => Direction::Forward,
            other => {
                tracing::debug!(direction = other, "Unknown direction, extracting forward");
                Direction::Forward
            }
        }
    }
}

/// Compute the half-open frame window for a batch of `total` frames
///
/// `start` is clamped to `[0, total - 1]` and `count` to at least 1.
/// Returns an empty range when `total` is 0.
pub fn frame_window(total: usize, start: usize, direction: Direction, count: usize) -> Range<usize> {
    if total == 0 {
        return 0..0;
    }
    let start = start.min(total - 1);
    let count = count.max(1);
    match direction {
        Direction::Backward => start..(start + count).min(total),
        Direction::Forward => {
            let end = start + 1;
            end.saturating_sub(count)..end
        }
    }
}

/// Extracts a contiguous window of frames from an image batch
pub struct ExtractFramesNode;

impl ExtractFramesNode {
    pub fn extract(
        &self,
        images: &ImageBatch,
        start: usize,
        direction: Direction,
        count: usize,
    ) -> ImageBatch {
        let total = images.len();
        if total == 0 {
            tracing::info!("Input batch is empty, returning it unchanged");
            return images.clone();
        }

        let window = frame_window(total, start, direction, count);
        tracing::info!(
            total,
            ?direction,
            start,
            count,
            "Extracting frames [{}:{}]",
            window.start,
            window.end
        );
        images.frames(window)
    }
}

impl SyncNode for ExtractFramesNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let images = inputs.image("image")?;
        // the upper bounds depend on the batch and are applied by `frame_window`
        let start = inputs.int_or("start_index", 0)?.max(0) as usize;
        let direction = Direction::from_name(&inputs.text_or("direction", "forward")?);
        let count = inputs.int_or("frame_count", 1)?.max(1) as usize;

        Ok(NodeOutput::single(self.extract(images, start, direction, count)))
    }
}

pub struct ExtractFramesNodeFactory;

impl NodeFactory for ExtractFramesNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Extract Frames From Batch (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Extracts a contiguous window of frames from an image batch")
            .category("image/batch")
            .function("extract_frames")
            .input(InputSpec::required("image", DataKind::Image))
            .input(
                InputSpec::required("start_index", DataKind::Int)
                    .default(0)
                    .range(0.0, MAX_FRAMES as f64)
                    .step(1.0),
            )
            .input(InputSpec::required("direction", DataKind::String).choices(["forward", "backward"]))
            .input(
                InputSpec::required("frame_count", DataKind::Int)
                    .default(1)
                    .range(1.0, MAX_FRAMES as f64)
                    .step(1.0),
            )
            .output("image", DataKind::Image)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(ExtractFramesNode)))
    }
}
