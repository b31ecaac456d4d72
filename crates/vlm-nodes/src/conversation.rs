//! Conversation assembly for a single prompt

use ck_nodes_core::ImageBatch;
use serde::Serialize;

pub const DEFAULT_USER_TEXT: &str = "Describe this.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Media parts are placeholders; the frames travel alongside the prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Image,
    Video,
    Text { text: String },
}

/// Messages for the chat template plus the media they reference
#[derive(Debug, Clone)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub image: Option<ImageBatch>,
    pub video: Option<ImageBatch>,
}

/// `count` indices spread evenly over `0..total`, truncated like an integer `linspace`
///
/// Returns every index when `total <= count`.
pub fn sample_frame_indices(total: usize, count: usize) -> Vec<usize> {
    if total <= count {
        return (0..total).collect();
    }
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let step = (total - 1) as f64 / (count - 1) as f64;
            let mut indices: Vec<usize> = (0..count).map(|i| (i as f64 * step) as usize).collect();
            indices[count - 1] = total - 1;
            indices
        }
    }
}

impl Conversation {
    /// Build the exchange from the node inputs
    ///
    /// Only the first frame of `image` is used; `video` is subsampled to at
    /// most `frame_count` frames.
    pub fn build(
        system_prompt: &str,
        user_prompt: &str,
        image: Option<&ImageBatch>,
        video: Option<&ImageBatch>,
        frame_count: usize,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        let system = system_prompt.trim();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(system.to_string()),
            });
        }

        let mut parts = Vec::with_capacity(3);
        let image = image.filter(|batch| !batch.is_empty()).map(|batch| batch.frames(0..1));
        if image.is_some() {
            parts.push(ContentPart::Image);
        }

        let video = video
            .map(|batch| batch.select(&sample_frame_indices(batch.len(), frame_count)))
            .filter(|frames| !frames.is_empty());
        if video.is_some() {
            parts.push(ContentPart::Video);
        }

        let text = if user_prompt.is_empty() {
            DEFAULT_USER_TEXT.to_string()
        } else {
            user_prompt.trim().to_string()
        };
        parts.push(ContentPart::Text { text });

        messages.push(ChatMessage {
            role: "user",
            content: MessageContent::Parts(parts),
        });

        Self {
            messages,
            image,
            video,
        }
    }
}
