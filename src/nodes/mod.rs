//! Built-in node library.

pub mod control;
pub mod data;
pub mod foreach;
pub mod text;

pub use control::{ForEachItemNode, MergeNode, PassThroughNode, SwitchNode};
pub use foreach::ForEachNode;

use std::sync::Arc;

use crate::node::NodeRegistry;

/// Register every built-in node type.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register("ForEachItem", "control", |_| Arc::new(ForEachItemNode::new()));
    registry.register("Switch", "control", |config| {
        Arc::new(SwitchNode::from_config(config))
    });
    registry.register("Merge", "control", |config| {
        Arc::new(MergeNode::from_config(config))
    });
    registry.register("PassThrough", "control", |_| Arc::new(PassThroughNode::new()));
    registry.register("ForEach", "control", |_| Arc::new(ForEachNode::new()));

    registry.register("TextInput", "text", |_| Arc::new(text::TextInputNode::new()));
    registry.register("TextStrip", "text", |_| Arc::new(text::TextStripNode::new()));
    registry.register("TextToList", "text", |_| Arc::new(text::TextToListNode::new()));
    registry.register("ListToText", "text", |_| Arc::new(text::ListToTextNode::new()));
    registry.register("TextConcat", "text", |_| Arc::new(text::TextConcatNode::new()));
    registry.register("TextTemplate", "text", |_| {
        Arc::new(text::TextTemplateNode::new())
    });

    registry.register("NumberInput", "math", |_| {
        Arc::new(data::NumberInputNode::new())
    });
    registry.register("MathOperation", "math", |_| {
        Arc::new(data::MathOperationNode::new())
    });

    registry.register("JsonParse", "json", |_| Arc::new(data::JsonParseNode::new()));
    registry.register("JsonExtract", "json", |_| Arc::new(data::JsonExtractNode::new()));

    registry.register("ListRange", "list", |_| Arc::new(data::ListRangeNode::new()));
    registry.register("ListIndex", "list", |_| Arc::new(data::ListIndexNode::new()));
    registry.register("ListLength", "list", |_| Arc::new(data::ListLengthNode::new()));

    registry.register("Delay", "utility", |_| Arc::new(data::DelayNode::new()));
}
