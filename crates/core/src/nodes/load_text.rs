//! Loading text files into a line dictionary

use crate::data::{NodeInputs, NodeOutput, RuntimeData};
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::Result;
use serde_json::{json, Value};
use std::path::Path;

pub const NODE_TYPE: &str = "Text_Load_From_File";

/// Placeholder meaning "name the dictionary after the file"
pub const FILENAME_PLACEHOLDER: &str = "[filename]";

/// Dictionary key for `file_path`: the file name up to its first '.'
pub fn dictionary_key(file_path: &str, dictionary_name: &str) -> String {
    if dictionary_name != FILENAME_PLACEHOLDER {
        return dictionary_name.to_string();
    }
    let base = Path::new(file_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match base.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base,
    }
}

/// Non-comment lines of `text` with line terminators removed
pub fn content_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n')
        .filter(|line| !line.trim().starts_with('#'))
        .map(|line| line.replace(['\n', '\r'], ""))
        .collect()
}

/// Load `file_path`, returning the joined text and the `{key: [lines]}` dictionary
///
/// Missing or unreadable files produce empty results and a warning.
pub fn load_text_file(file_path: &str, dictionary_name: &str) -> (String, Value) {
    let key = dictionary_key(file_path, dictionary_name);
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!(path = %file_path, "The specified path cannot be found");
        return (String::new(), json!({ key: [] }));
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %file_path, error = %e, "Failed to read text file");
            return (String::new(), json!({ key: [] }));
        }
    };

    let lines = content_lines(&text);
    (lines.join("\n"), json!({ key: lines }))
}

pub struct LoadTextNode;

impl SyncNode for LoadTextNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let file_path = inputs.text_or("file_path", "")?;
        let dictionary_name = inputs.text_or("dictionary_name", FILENAME_PLACEHOLDER)?;
        let (text, dictionary) = load_text_file(&file_path, &dictionary_name);
        Ok(NodeOutput::new(vec![
            RuntimeData::Text(text),
            RuntimeData::Json(dictionary),
        ]))
    }
}

pub struct LoadTextNodeFactory;

impl NodeFactory for LoadTextNodeFactory {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Load Text From File (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(NODE_TYPE)
            .display_name(self.display_name())
            .description("Loads a text file, skipping lines that start with '#'")
            .function("load_file")
            .input(InputSpec::required("file_path", DataKind::String).default(""))
            .input(InputSpec::required("dictionary_name", DataKind::String).default(FILENAME_PLACEHOLDER))
            .output("STRING", DataKind::String)
            .output("DICT", DataKind::Json)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(LoadTextNode)))
    }
}
