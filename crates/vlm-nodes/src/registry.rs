//! Registration of the vision-language node

#[cfg(not(feature = "candle"))]
use crate::backend::UnavailableLoader;
use crate::backend::VisionLanguageLoader;
use crate::models::ModelCatalog;
use crate::node::QwenVlNodeFactory;
use ck_nodes_core::{NodeContext, NodeRegistryBuilder};
use std::sync::Arc;

/// Register the vision-language node
///
/// Without a `loader` the candle backend is used when the `candle` feature is
/// enabled. Otherwise the node is still listed, but every load reports that
/// no inference backend is available.
///
/// # Example
///
/// ```ignore
/// let mut builder = NodeRegistryBuilder::new();
/// register_vlm_nodes(&mut builder, &ctx, Some(Arc::new(MyLoader::new())));
/// ```
pub fn register_vlm_nodes(
    builder: &mut NodeRegistryBuilder,
    ctx: &NodeContext,
    loader: Option<Arc<dyn VisionLanguageLoader>>,
) {
    let catalog = ModelCatalog::new(ctx.host.prompt_generator_paths());
    builder.register_unit("vlm", move |unit| {
        let loader = loader.unwrap_or_else(default_loader);
        tracing::info!(backend = loader.name(), "Registered vision-language node factory");
        unit.register(Arc::new(QwenVlNodeFactory::new(catalog, loader)));
        Ok(())
    });
}

#[cfg(feature = "candle")]
fn default_loader() -> Arc<dyn VisionLanguageLoader> {
    Arc::new(crate::candle::CandleLoader::new())
}

#[cfg(not(feature = "candle"))]
fn default_loader() -> Arc<dyn VisionLanguageLoader> {
    tracing::warn!("No vision-language backend linked, local model loads will fail");
    Arc::new(UnavailableLoader)
}
