//! Latent context stitching for video continuation
//!
//! The forward variant encodes the tail of a previous clip into the first
//! latent frames of a new generation; the reverse variant encodes the head
//! of the next clip into the last latent frames. The stitched frames get a
//! noise mask of `1 - strength` so the sampler keeps them (mostly) fixed.

use crate::data::{ImageBatch, Latent, LatentCodec, NodeInputs, NodeOutput};
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::{Error, Result};
use ndarray::{s, Array5};
use serde_json::Value;
use std::ops::Range;

pub const FORWARD_NODE_TYPE: &str = "LTXVContext_TTP";
pub const REVERSE_NODE_TYPE: &str = "LTXVContext_Reverse_TTP";

/// Pixel frames per latent frame after the first
pub const TEMPORAL_STRIDE: usize = 8;

pub const DEFAULT_CONTEXT_FRAMES: i64 = 6;
pub const MIN_CONTEXT_FRAMES: i64 = 2;
pub const MAX_CONTEXT_FRAMES: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSide {
    /// Tail of the previous clip becomes the head of the latent
    Forward,
    /// Head of the next clip becomes the tail of the latent
    Reverse,
}

impl ContextSide {
    fn node_type(&self) -> &'static str {
        match self {
            ContextSide::Forward => FORWARD_NODE_TYPE,
            ContextSide::Reverse => REVERSE_NODE_TYPE,
        }
    }

    fn video_input(&self) -> &'static str {
        match self {
            ContextSide::Forward => "previous_video",
            ContextSide::Reverse => "next_video",
        }
    }
}

/// Pixel frames needed to produce `latent_frames` latent frames: `(K - 1) * 8 + 1`
pub fn required_pixel_frames(latent_frames: usize) -> usize {
    latent_frames.saturating_sub(1) * TEMPORAL_STRIDE + 1
}

/// Source frames used as context
pub fn source_window(side: ContextSide, total: usize, required: usize) -> Range<usize> {
    match side {
        ContextSide::Forward => total.saturating_sub(required)..total,
        ContextSide::Reverse => 0..required.min(total),
    }
}

/// Latent frames overwritten by `embed` context frames in a latent of `frames`
pub fn target_window(side: ContextSide, frames: usize, embed: usize) -> Range<usize> {
    match side {
        ContextSide::Forward => 0..embed,
        ContextSide::Reverse => frames - embed..frames,
    }
}

/// Stitch `video` into `latent` using `codec`
pub fn apply_context(
    side: ContextSide,
    video: &ImageBatch,
    codec: &dyn LatentCodec,
    latent: &Latent,
    context_latent_frames: usize,
    strength: f32,
) -> Result<Latent> {
    let video_input = side.video_input();
    if video.is_empty() {
        return Err(Error::invalid_input(video_input, "video has no frames"));
    }

    let mut samples = latent.samples.clone();
    let (batch, channels, frames, height, width) = samples.dim();
    let mut noise_mask = match &latent.noise_mask {
        // any mask layout works as long as batch and time line up
        Some(mask) => {
            let (mask_batch, _, mask_frames, _, _) = mask.dim();
            if mask_batch != batch || mask_frames != frames {
                return Err(Error::invalid_input(
                    "latent",
                    format!("noise mask shape {:?} does not match latent {:?}", mask.dim(), samples.dim()),
                ));
            }
            mask.clone()
        }
        None => Array5::ones((batch, 1, frames, 1, 1)),
    };

    let (_, h_scale, w_scale) = codec.downscale_ratio();
    let (target_h, target_w) = (height * h_scale, width * w_scale);

    let required = required_pixel_frames(context_latent_frames);
    let window = source_window(side, video.len(), required);
    tracing::debug!(
        node_type = side.node_type(),
        required,
        "Encoding context frames [{}:{}] of {}",
        window.start,
        window.end,
        video.len()
    );

    let mut pixels = video.frames(window);
    if pixels.height() != target_h || pixels.width() != target_w {
        pixels = pixels.resize_bilinear_center(target_w, target_h);
    }
    let encoded = codec.encode(&pixels.rgb())?;

    let (enc_batch, enc_channels, enc_frames, enc_h, enc_w) = encoded.dim();
    if enc_channels != channels || enc_h != height || enc_w != width || (enc_batch != 1 && enc_batch != batch) {
        return Err(Error::invalid_input(
            "vae",
            format!(
                "encoded context {:?} is incompatible with latent {:?}",
                encoded.dim(),
                samples.dim()
            ),
        ));
    }

    let embed = enc_frames.min(frames);
    let target = target_window(side, frames, embed);
    let encoded_slice = encoded.slice(s![.., .., 0..embed, .., ..]);
    let encoded_slice = encoded_slice.broadcast((batch, channels, embed, height, width)).ok_or_else(|| {
        Error::invalid_input("vae", "encoded context batch cannot be broadcast to the latent batch")
    })?;
    samples
        .slice_mut(s![.., .., target.clone(), .., ..])
        .assign(&encoded_slice);
    noise_mask
        .slice_mut(s![.., .., target, .., ..])
        .fill(1.0 - strength);

    Ok(Latent {
        samples,
        noise_mask: Some(noise_mask),
    })
}

pub struct LatentContextNode {
    side: ContextSide,
}

impl LatentContextNode {
    pub fn new(side: ContextSide) -> Self {
        Self { side }
    }
}

impl SyncNode for LatentContextNode {
    fn node_type(&self) -> &str {
        self.side.node_type()
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let video = inputs.image(self.side.video_input())?;
        let codec = inputs.codec("vae")?;
        let latent = inputs.latent("latent")?;
        let context_frames = inputs
            .int_or("context_latent_frames", DEFAULT_CONTEXT_FRAMES)?
            .clamp(MIN_CONTEXT_FRAMES, MAX_CONTEXT_FRAMES) as usize;
        let strength = inputs.float_or("context_strength", 1.0)?.clamp(0.0, 1.0) as f32;

        let stitched = apply_context(self.side, video, codec.as_ref(), latent, context_frames, strength)?;
        Ok(NodeOutput::single(stitched))
    }
}

pub struct LatentContextNodeFactory {
    side: ContextSide,
}

impl LatentContextNodeFactory {
    pub fn forward() -> Self {
        Self {
            side: ContextSide::Forward,
        }
    }

    pub fn reverse() -> Self {
        Self {
            side: ContextSide::Reverse,
        }
    }
}

impl NodeFactory for LatentContextNodeFactory {
    fn node_type(&self) -> &str {
        self.side.node_type()
    }

    fn display_name(&self) -> &str {
        match self.side {
            ContextSide::Forward => "LTXV Context Forward (CK)",
            ContextSide::Reverse => "LTXV Context Reverse (CK)",
        }
    }

    fn schema(&self) -> NodeSchema {
        let (description, function, frames_tip, strength_tip) = match self.side {
            ContextSide::Forward => (
                "Applies the end of the previous video to the start of the new latent",
                "apply_context",
                "Latent frames taken from the end of previous_video (6 latent frames = 41 pixel frames)",
                "Context lock strength (1.0 = fully fixed, <1.0 allows refinement)",
            ),
            ContextSide::Reverse => (
                "Applies the start of the next video to the end of the new latent",
                "apply_reverse_context",
                "Latent frames taken from the start of next_video",
                "Context lock strength",
            ),
        };
        NodeSchema::new(self.side.node_type())
            .display_name(self.display_name())
            .description(description)
            .function(function)
            .input(InputSpec::required(self.side.video_input(), DataKind::Image))
            .input(InputSpec::required("vae", DataKind::Vae))
            .input(InputSpec::required("latent", DataKind::Latent))
            .input(
                InputSpec::required("context_latent_frames", DataKind::Int)
                    .default(DEFAULT_CONTEXT_FRAMES)
                    .range(MIN_CONTEXT_FRAMES as f64, MAX_CONTEXT_FRAMES as f64)
                    .step(1.0)
                    .tooltip(frames_tip),
            )
            .input(
                InputSpec::optional("context_strength", DataKind::Float)
                    .default(1.0)
                    .range(0.0, 1.0)
                    .step(0.05)
                    .tooltip(strength_tip),
            )
            .output("latent", DataKind::Latent)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(LatentContextNode::new(self.side))))
    }
}
