//! CK nodes core
//!
//! Shared building blocks for the CK media graph node pack:
//!
//! - [`data`]: the [`RuntimeData`](data::RuntimeData) sum type exchanged with
//!   the host, image batches, latents and audio
//! - [`nodes`]: node traits, schemas, the registry and the core node set
//! - [`config`] / [`net`]: host paths and the shared network configuration
//!
//! # Example
//!
//! ```ignore
//! use ck_nodes_core::{register_core_nodes, NodeContext, NodeRegistryBuilder};
//!
//! let ctx = NodeContext::default();
//! let mut builder = NodeRegistryBuilder::new();
//! register_core_nodes(&mut builder, &ctx);
//! let registry = builder.build();
//! let node = registry.create_node("TextLineCount", "n1".into(), &serde_json::Value::Null)?;
//! ```

pub mod config;
pub mod data;
pub mod encoding;
pub mod error;
pub mod net;
pub mod nodes;

pub use config::{HostConfig, NodeContext};
pub use data::{
    AudioWaveform, ImageBatch, Latent, LatentCodec, NodeInputs, NodeOutput, RuntimeData, UiFile,
    UiPayload,
};
pub use error::{Error, Result};
pub use net::{NetworkConfig, SharedNetworkConfig};
pub use nodes::{
    register_core_nodes, AsyncNode, AsyncNodeWrapper, DataKind, InputSpec, Node, NodeFactory,
    NodeRegistry, NodeRegistryBuilder, NodeSchema, SyncNode, SyncNodeWrapper,
};
