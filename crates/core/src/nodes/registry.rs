//! Node registry
//!
//! Registration happens once at startup through a [`NodeRegistryBuilder`].
//! Factories are grouped into registration units; a unit that fails is
//! logged and skipped without affecting the others. The finished
//! [`NodeRegistry`] is immutable and passed around by reference.

use crate::nodes::node::{Node, NodeFactory};
use crate::nodes::schema::NodeSchema;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Factories staged by one registration unit
#[derive(Default)]
pub struct RegistrationUnit {
    factories: Vec<Arc<dyn NodeFactory>>,
}

impl RegistrationUnit {
    /// Stage a factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Mutable registry used during startup
#[derive(Default)]
pub struct NodeRegistryBuilder {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
    display_names: HashMap<String, String>,
    failed_units: Vec<String>,
}

impl NodeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one registration unit
    ///
    /// Factories staged by `register` are merged only when it returns `Ok`.
    /// Returns whether the unit was applied.
    pub fn register_unit<F>(&mut self, unit_name: &str, register: F) -> bool
    where
        F: FnOnce(&mut RegistrationUnit) -> Result<()>,
    {
        let mut unit = RegistrationUnit::default();
        match register(&mut unit) {
            Ok(()) => {
                tracing::debug!(unit = unit_name, nodes = unit.len(), "Registration unit loaded");
                for factory in unit.factories {
                    self.insert(factory);
                }
                true
            }
            Err(e) => {
                tracing::error!(unit = unit_name, error = %e, "Failed to load registration unit");
                self.failed_units.push(unit_name.to_string());
                false
            }
        }
    }

    /// Register a single factory outside of any unit
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        self.insert(factory);
    }

    fn insert(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        if self.factories.contains_key(&node_type) {
            tracing::warn!(node_type = %node_type, "Node type registered twice, keeping the later factory");
        }
        self.display_names
            .insert(node_type.clone(), factory.display_name().to_string());
        self.factories.insert(node_type, factory);
    }

    /// Names of units that failed to load
    pub fn failed_units(&self) -> &[String] {
        &self.failed_units
    }

    /// Freeze into an immutable registry
    pub fn build(self) -> NodeRegistry {
        let registry = NodeRegistry {
            factories: self.factories,
            display_names: self.display_names,
        };
        tracing::info!(
            count = registry.len(),
            nodes = ?registry.list_types(),
            "Node registry built"
        );
        registry
    }
}

/// Immutable registry of node factories
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
    display_names: HashMap<String, String>,
}

impl NodeRegistry {
    /// Create a node by type
    ///
    /// # Arguments
    /// * `node_type` - The type of node to create
    /// * `node_id` - Unique identifier for this node instance
    /// * `params` - Node construction parameters
    pub fn create_node(&self, node_type: &str, node_id: String, params: &Value) -> Result<Box<dyn Node>> {
        let factory = self.factories.get(node_type).ok_or_else(|| Error::UnknownNodeType {
            node_type: node_type.to_string(),
            available: self.list_types(),
        })?;

        factory.create(node_id, params)
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// List all registered node types
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn display_name(&self, node_type: &str) -> Option<&str> {
        self.display_names.get(node_type).map(String::as_str)
    }

    /// Node type to display name mapping
    pub fn display_names(&self) -> &HashMap<String, String> {
        &self.display_names
    }

    pub fn schema(&self, node_type: &str) -> Option<NodeSchema> {
        self.factories.get(node_type).map(|factory| factory.schema())
    }

    /// Schemas of every node, sorted by type
    pub fn schemas(&self) -> Vec<NodeSchema> {
        self.list_types()
            .iter()
            .filter_map(|node_type| self.schema(node_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NodeInputs, NodeOutput, RuntimeData};
    use crate::nodes::node::{SyncNode, SyncNodeWrapper};

    struct ConstNode(i64);

    impl SyncNode for ConstNode {
        fn node_type(&self) -> &str {
            "Const"
        }

        fn process(&self, _inputs: NodeInputs) -> Result<NodeOutput> {
            Ok(NodeOutput::single(self.0))
        }
    }

    struct ConstFactory {
        value: i64,
        display: &'static str,
    }

    impl NodeFactory for ConstFactory {
        fn node_type(&self) -> &str {
            "Const"
        }

        fn display_name(&self) -> &str {
            self.display
        }

        fn schema(&self) -> NodeSchema {
            NodeSchema::new("Const").display_name(self.display)
        }

        fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
            Ok(Box::new(SyncNodeWrapper(ConstNode(self.value))))
        }
    }

    #[tokio::test]
    async fn test_later_registration_wins() {
        let mut builder = NodeRegistryBuilder::new();
        builder.register(Arc::new(ConstFactory { value: 1, display: "first" }));
        builder.register(Arc::new(ConstFactory { value: 2, display: "second" }));
        let registry = builder.build();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_name("Const"), Some("second"));
        let node = registry.create_node("Const", "n1".into(), &Value::Null).unwrap();
        let output = node.process(NodeInputs::new()).await.unwrap();
        assert!(matches!(output.get(0), RuntimeData::Int(2)));
    }

    #[test]
    fn test_failed_unit_is_skipped() {
        let mut builder = NodeRegistryBuilder::new();
        let applied = builder.register_unit("broken", |unit| {
            unit.register(Arc::new(ConstFactory { value: 1, display: "x" }));
            Err(Error::config("missing dependency"))
        });
        assert!(!applied);
        assert!(builder.register_unit("ok", |_| Ok(())));
        assert_eq!(builder.failed_units(), ["broken".to_string()]);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_unknown_type_lists_available() {
        let mut builder = NodeRegistryBuilder::new();
        builder.register(Arc::new(ConstFactory { value: 1, display: "x" }));
        let registry = builder.build();
        match registry.create_node("Nope", "n".into(), &Value::Null) {
            Err(Error::UnknownNodeType { available, .. }) => assert_eq!(available, vec!["Const"]),
            _ => panic!("expected UnknownNodeType"),
        }
    }
}
