//! Node traits, schema, registry and the core node set

pub mod context;
pub mod frames;
pub mod load_text;
pub mod network;
pub mod node;
pub mod registry;
pub mod save_image;
pub mod schema;
pub mod text;
pub mod utility;

pub use node::{parse_params, AsyncNode, AsyncNodeWrapper, Node, NodeFactory, SyncNode, SyncNodeWrapper};
pub use registry::{NodeRegistry, NodeRegistryBuilder, RegistrationUnit};
pub use schema::{DataKind, HasNodeSchema, InputSpec, NodeSchema, OutputSpec, Requirement, CATEGORY};

use crate::config::NodeContext;
use std::sync::Arc;

/// Register every core node
///
/// Each node family is its own registration unit so a failure in one
/// leaves the others available. Also logs the network configuration
/// the nodes start with.
pub fn register_core_nodes(builder: &mut NodeRegistryBuilder, ctx: &NodeContext) {
    builder.register_unit("frames", |unit| {
        unit.register(Arc::new(frames::ExtractFramesNodeFactory));
        Ok(())
    });

    builder.register_unit("text", |unit| {
        unit.register(Arc::new(text::TextConcatenateNodeFactory));
        unit.register(Arc::new(text::TextLineCountNodeFactory));
        unit.register(Arc::new(load_text::LoadTextNodeFactory));
        Ok(())
    });

    builder.register_unit("utility", |unit| {
        unit.register(Arc::new(utility::AnyListCountNodeFactory));
        unit.register(Arc::new(utility::AnyNullNodeFactory));
        Ok(())
    });

    builder.register_unit("network", |unit| {
        unit.register(Arc::new(network::NetDebugNodeFactory::new(Arc::clone(&ctx.network))));
        unit.register(Arc::new(network::NetSettingsNodeFactory::new(Arc::clone(&ctx.network))));
        Ok(())
    });

    builder.register_unit("save_image", |unit| {
        unit.register(Arc::new(save_image::SaveImageNodeFactory::new(Arc::clone(&ctx.host))));
        Ok(())
    });

    builder.register_unit("ltx_context", |unit| {
        unit.register(Arc::new(context::LatentContextNodeFactory::forward()));
        unit.register(Arc::new(context::LatentContextNodeFactory::reverse()));
        Ok(())
    });

    let startup_report = network::render_report(&ctx.network.read(), None);
    tracing::info!("Network at startup\n{}", startup_report);
}
