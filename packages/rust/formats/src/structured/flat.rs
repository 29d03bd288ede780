//! Flat-array vendor schema: a top-level array of loose turn fragments.
//!
//! There is no user/assistant pairing here. Each element may carry
//! `content.ToolUseResults` and/or a `Response` block, extracted in that order.

use serde_json::Value;
use tracing::debug;

use convoreplay_shared::{ConversationData, ConversationMeta, now_timestamp};

use super::StructuredFormat;
use super::turns::{extract_response, extract_tool_results};
use crate::sink::MessageSink;

pub struct FlatFormat;

fn has_marker(element: &Value) -> bool {
    let tool_results = element
        .get("content")
        .and_then(|c| c.get("ToolUseResults"))
        .is_some_and(|v| !v.is_null());
    let response = element.get("Response").is_some_and(|v| !v.is_null());
    tool_results || response
}

impl StructuredFormat for FlatFormat {
    fn detect(&self, value: &Value) -> bool {
        value
            .as_array()
            .is_some_and(|elements| elements.iter().any(has_marker))
    }

    fn parse(&self, value: &Value) -> ConversationData {
        let elements = value.as_array().map(Vec::as_slice).unwrap_or_default();
        debug!(elements = elements.len(), "parsing flat turn array");

        let mut sink = MessageSink::new();
        for element in elements {
            let ts = element.get("timestamp").and_then(Value::as_str);
            if let Some(content) = element.get("content") {
                extract_tool_results(content, ts, &mut sink);
            }
            extract_response(element, ts, &mut sink);
        }

        ConversationData {
            metadata: ConversationMeta {
                title: "Amazon Q Conversation".to_string(),
                timestamp: now_timestamp(),
                format: "json-amazonq".to_string(),
                source: None,
            },
            messages: sink.into_messages(),
        }
    }

    fn name(&self) -> &str {
        "flat-array"
    }
}
