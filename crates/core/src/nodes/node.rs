//! Node traits
//!
//! Nodes implement either [`SyncNode`] (pure CPU work) or [`AsyncNode`]
//! (I/O, subprocesses, remote calls). Both are adapted to the unified
//! [`Node`] trait used by the registry.

use crate::data::{NodeInputs, NodeOutput};
use crate::nodes::schema::NodeSchema;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;

/// Synchronous node
///
/// Implement this for nodes whose work is a quick in-memory transform.
pub trait SyncNode: Send + Sync {
    /// Get the node type name
    fn node_type(&self) -> &str;

    /// Run one invocation
    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput>;
}

/// Asynchronous node
///
/// Implement this for nodes that perform I/O (HTTP, subprocesses, files)
/// or hand heavy work to a blocking thread.
#[async_trait::async_trait]
pub trait AsyncNode: Send + Sync {
    /// Get the node type name
    fn node_type(&self) -> &str;

    /// Prepare resources before the first invocation
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Run one invocation
    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput>;
}

/// Unified node trait that can handle both sync and async nodes
///
/// This is the trait handed out by the registry.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
    /// Get the node type name
    fn node_type(&self) -> &str;

    /// Initialize the node (load resources, etc.)
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Run one invocation
    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput>;
}

/// Wrapper that makes a SyncNode into a Node
pub struct SyncNodeWrapper<T: SyncNode>(pub T);

#[async_trait::async_trait]
impl<T: SyncNode + 'static> Node for SyncNodeWrapper<T> {
    fn node_type(&self) -> &str {
        self.0.node_type()
    }

    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        self.0.process(inputs)
    }
}

/// Wrapper that makes an AsyncNode into a Node
pub struct AsyncNodeWrapper<T: AsyncNode>(pub Arc<T>);

#[async_trait::async_trait]
impl<T: AsyncNode + 'static> Node for AsyncNodeWrapper<T> {
    fn node_type(&self) -> &str {
        self.0.node_type()
    }

    async fn initialize(&self) -> Result<()> {
        self.0.initialize().await
    }

    async fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        self.0.process(inputs).await
    }
}

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Get the node type this factory creates
    fn node_type(&self) -> &str;

    /// Human readable name shown by the host
    fn display_name(&self) -> &str;

    /// Declared inputs, outputs and metadata
    fn schema(&self) -> NodeSchema;

    /// Create a new node instance
    ///
    /// # Arguments
    /// * `node_id` - Unique identifier for this node instance
    /// * `params` - Node construction parameters (JSON object, may be null)
    fn create(&self, node_id: String, params: &Value) -> Result<Box<dyn Node>>;
}

/// Deserialize factory parameters, treating `null` as the default config
pub fn parse_params<T>(params: &Value) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(params.clone())?)
}
