//! Remote video generation: API client, polling, decoding and the node

pub mod api;
pub mod decode;
#[cfg(feature = "video")]
mod ffmpeg;
pub mod node;
pub mod poll;

pub use api::{GenerationRequest, HttpVideoApi, TaskStatus, VideoApi};
pub use decode::{DecodedFrames, FfmpegDecoder, MediaDecoder};
pub use node::{error_output, VideoGenerationNode, VideoGenerationNodeFactory, VideoJob, VideoNodeConfig};
pub use poll::{wait_for_video, PollPolicy};
