//! Remote API nodes for the CK node pack
//!
//! - [`chat`]: `SimpleOpenAI_LLM`, a chat-completion client for any
//!   OpenAI-compatible endpoint
//! - [`video`]: `CK_Googel_Veo3`, a submit / poll / download video job
//!
//! Both build their HTTP clients from the shared
//! [`NetworkConfig`](ck_nodes_core::NetworkConfig), so proxy changes made
//! by the network settings node apply to the next request.

pub mod chat;
pub mod config_store;
pub mod data_url;
pub mod error;
pub mod video;

pub use config_store::ApiKeyStore;
pub use error::{ApiNodeError, Result};

use ck_nodes_core::{NodeContext, NodeRegistryBuilder};
use std::sync::Arc;

/// Register the remote API nodes
pub fn register_api_nodes(builder: &mut NodeRegistryBuilder, ctx: &NodeContext) {
    builder.register_unit("chat", |unit| {
        unit.register(Arc::new(chat::SimpleLlmNodeFactory::new(Arc::clone(&ctx.network))));
        Ok(())
    });

    builder.register_unit("video", |unit| {
        unit.register(Arc::new(video::VideoGenerationNodeFactory::new(ctx.clone())));
        Ok(())
    });
}
