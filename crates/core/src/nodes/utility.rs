//! Type-agnostic helper nodes: list counting and the null source

use crate::data::{NodeInputs, NodeOutput, RuntimeData};
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::Result;
use serde_json::Value;

pub const LIST_COUNT_NODE_TYPE: &str = "AnyListCount";
pub const NULL_NODE_TYPE: &str = "AnyNullNode";

/// Count the items of a list-valued input
///
/// A list with several entries counts its entries. A single entry counts
/// the batch it carries (image frames, latent samples) or 1 for anything
/// else. Non-list values are treated as a one-item list.
pub fn count_items(value: &RuntimeData) -> usize {
    let items = match value {
        RuntimeData::List(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    match items {
        [] => 0,
        [single] => match single {
            RuntimeData::Image(images) => images.len(),
            RuntimeData::Latent(latent) => latent.batch(),
            _ => 1,
        },
        many => many.len(),
    }
}

pub struct AnyListCountNode;

impl SyncNode for AnyListCountNode {
    fn node_type(&self) -> &str {
        LIST_COUNT_NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        // an unconnected input arrives as an empty list
        let value = match inputs.get("any_input") {
            Some(value) => value.clone(),
            None => RuntimeData::List(Vec::new()),
        };
        Ok(NodeOutput::single(count_items(&value) as i64))
    }
}

pub struct AnyNullNode;

impl SyncNode for AnyNullNode {
    fn node_type(&self) -> &str {
        NULL_NODE_TYPE
    }

    fn process(&self, _inputs: NodeInputs) -> Result<NodeOutput> {
        Ok(NodeOutput::single(RuntimeData::None))
    }
}

pub struct AnyListCountNodeFactory;

impl NodeFactory for AnyListCountNodeFactory {
    fn node_type(&self) -> &str {
        LIST_COUNT_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Any List Count (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(LIST_COUNT_NODE_TYPE)
            .display_name(self.display_name())
            .category("CKNodes/logic")
            .function("count_any")
            .input(InputSpec::required("any_input", DataKind::Any))
            .input_is_list()
            .output("count", DataKind::Int)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(AnyListCountNode)))
    }
}

pub struct AnyNullNodeFactory;

impl NodeFactory for AnyNullNodeFactory {
    fn node_type(&self) -> &str {
        NULL_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Null Input (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NULL_NODE_TYPE)
            .display_name(self.display_name())
            .description("Outputs nothing; connects to any input")
            .function("do_nothing")
            .output("Null/Empty", DataKind::Any)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(AnyNullNode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageBatch, Latent};
    use ndarray::Array5;

    #[test]
    fn test_count_multi_item_list() {
        let list = RuntimeData::List(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(count_items(&list), 3);
    }

    #[test]
    fn test_count_single_image_batch() {
        let list = RuntimeData::List(vec![ImageBatch::zeros(7, 2, 2, 3).into()]);
        assert_eq!(count_items(&list), 7);
    }

    #[test]
    fn test_count_single_latent_batch() {
        let latent = Latent::new(Array5::zeros((2, 4, 1, 1, 1)));
        assert_eq!(count_items(&RuntimeData::List(vec![latent.into()])), 2);
    }

    #[test]
    fn test_count_scalars_and_empty() {
        assert_eq!(count_items(&RuntimeData::List(vec!["x".into()])), 1);
        assert_eq!(count_items(&RuntimeData::Text("x".into())), 1);
        assert_eq!(count_items(&RuntimeData::List(Vec::new())), 0);
    }

    #[test]
    fn test_unconnected_input_counts_zero() {
        let output = AnyListCountNode.process(NodeInputs::new()).unwrap();
        assert!(matches!(output.get(0), RuntimeData::Int(0)));
    }

    #[test]
    fn test_null_node_outputs_none() {
        let output = AnyNullNode.process(NodeInputs::new()).unwrap();
        assert_eq!(output.len(), 1);
        assert!(output.get(0).is_none());
    }
}
