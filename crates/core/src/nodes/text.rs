//! Text utility nodes: concatenation and line counting

use crate::data::{NodeInputs, NodeOutput};
use crate::nodes::node::{Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::Result;
use serde_json::Value;

pub const CONCATENATE_NODE_TYPE: &str = "Text_Concatenate";
pub const LINE_COUNT_NODE_TYPE: &str = "TextLineCount";

/// Optional text sockets of the concatenate node, in processing order
pub const CONCATENATE_INPUTS: [&str; 4] = ["text_a", "text_b", "text_c", "text_d"];

/// Join non-empty parts with `delimiter`
///
/// A delimiter of `"\n"` or the two-character escape `"\\n"` joins with a
/// newline. With `clean_whitespace` each part is trimmed first; parts that
/// end up empty are skipped either way.
pub fn concatenate<'a, I>(parts: I, delimiter: &str, clean_whitespace: bool) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let delimiter = if delimiter == "\n" || delimiter == "\\n" {
        "\n"
    } else {
        delimiter
    };

    parts
        .into_iter()
        .map(|part| if clean_whitespace { part.trim() } else { part })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Split on every line boundary recognised by Python's `str.splitlines`
///
/// `\r\n` counts as one boundary and a trailing boundary does not produce an
/// empty final line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        let is_break = matches!(
            ch,
            '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
        );
        if !is_break {
            continue;
        }
        lines.push(&text[start..index]);
        let mut next = index + ch.len_utf8();
        if ch == '\r' {
            if let Some(&(_, '\n')) = chars.peek() {
                chars.next();
                next += 1;
            }
        }
        start = next;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Count lines, optionally ignoring whitespace-only ones
pub fn count_lines(text: &str, ignore_empty_lines: bool) -> usize {
    if text.is_empty() {
        return 0;
    }
    let lines = split_lines(text);
    if ignore_empty_lines {
        lines.iter().filter(|line| !line.trim().is_empty()).count()
    } else {
        lines.len()
    }
}

pub struct TextConcatenateNode;

impl SyncNode for TextConcatenateNode {
    fn node_type(&self) -> &str {
        CONCATENATE_NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let delimiter = inputs.text_or("delimiter", ", ")?;
        let clean = inputs.bool_or("clean_whitespace", true)?;

        let mut parts = Vec::new();
        for name in CONCATENATE_INPUTS {
            if let Some(text) = inputs.opt_text(name)? {
                parts.push(text);
            }
        }

        Ok(NodeOutput::single(concatenate(parts, &delimiter, clean)))
    }
}

pub struct TextLineCountNode;

impl SyncNode for TextLineCountNode {
    fn node_type(&self) -> &str {
        LINE_COUNT_NODE_TYPE
    }

    fn process(&self, inputs: NodeInputs) -> Result<NodeOutput> {
        let text = inputs.text_or("text", "")?;
        let ignore_empty = inputs.bool_or("ignore_empty_lines", false)?;
        Ok(NodeOutput::single(count_lines(&text, ignore_empty) as i64))
    }
}

pub struct TextConcatenateNodeFactory;

impl NodeFactory for TextConcatenateNodeFactory {
    fn node_type(&self) -> &str {
        CONCATENATE_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Text Concatenate (CK)"
    }

    fn schema(&self) -> NodeSchema {
        let mut schema = NodeSchema::new(CONCATENATE_NODE_TYPE)
            .display_name(self.display_name())
            .function("text_concatenate")
            .input(InputSpec::required("delimiter", DataKind::String).default(", "))
            .input(InputSpec::required("clean_whitespace", DataKind::String).choices(["true", "false"]));
        for name in CONCATENATE_INPUTS {
            schema = schema.input(InputSpec::optional(name, DataKind::String).force_input());
        }
        schema.output("STRING", DataKind::String)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(TextConcatenateNode)))
    }
}

pub struct TextLineCountNodeFactory;

impl NodeFactory for TextLineCountNodeFactory {
    fn node_type(&self) -> &str {
        LINE_COUNT_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Text Line Count (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(LINE_COUNT_NODE_TYPE)
            .display_name(self.display_name())
            .category("CKNodes/text")
            .function("count_lines")
            .input(InputSpec::required("text", DataKind::String).multiline())
            .input(InputSpec::required("ignore_empty_lines", DataKind::Boolean).default(false))
            .output("line_count", DataKind::Int)
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(SyncNodeWrapper(TextLineCountNode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RuntimeData;

    #[test]
    fn test_concatenate_cleans_and_skips_empty() {
        assert_eq!(concatenate(["  a  ", "", "b"], ", ", true), "a, b");
    }

    #[test]
    fn test_concatenate_keeps_whitespace_when_not_cleaning() {
        assert_eq!(concatenate(["  a  ", "", "b"], ", ", false), "  a  , b");
        assert_eq!(concatenate(["   ", "b"], "|", false), "   |b");
    }

    #[test]
    fn test_concatenate_newline_delimiter() {
        assert_eq!(concatenate(["a", "b"], "\\n", true), "a\nb");
        assert_eq!(concatenate(["a", "b"], "\n", true), "a\nb");
    }

    #[test]
    fn test_concatenate_node_sorted_inputs() {
        let inputs = NodeInputs::new()
            .with("delimiter", "-")
            .with("clean_whitespace", "true")
            .with("text_c", "c")
            .with("text_a", " a ");
        let output = TextConcatenateNode.process(inputs).unwrap();
        assert_eq!(output.get(0).as_text(), Some("a-c"));
    }

    #[test]
    fn test_concatenate_no_inputs_is_empty() {
        let output = TextConcatenateNode.process(NodeInputs::new()).unwrap();
        assert_eq!(output.get(0).as_text(), Some(""));
    }

    #[test]
    fn test_split_lines_like_python() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n"), vec!["a"]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(split_lines("x\u{2028}y\x0cz"), vec!["x", "y", "z"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines("", false), 0);
        assert_eq!(count_lines("a\n  \nb\n", false), 3);
        assert_eq!(count_lines("a\n  \nb\n", true), 2);
    }

    #[test]
    fn test_line_count_node() {
        let inputs = NodeInputs::new()
            .with("text", "one\ntwo\n\nthree")
            .with("ignore_empty_lines", true);
        let output = TextLineCountNode.process(inputs).unwrap();
        assert!(matches!(output.get(0), RuntimeData::Int(3)));
    }
}
