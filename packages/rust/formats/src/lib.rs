//! Conversation format detection and parsing.
//!
//! Raw content is first tried as JSON. Valid documents are routed through the
//! [`FormatRegistry`]; anything that is not JSON at all is handed to the
//! line-oriented [`parse_transcript`] parser. Neither path can fail: every
//! input produces a [`ConversationData`].

mod sink;
pub mod structured;
pub mod transcript;

use serde_json::Value;
use tracing::{debug, instrument};

use convoreplay_shared::ConversationData;

pub use structured::{
    CURRENT_VERSION, EntryShape, FormatAnalysis, FormatRegistry, HistoryVersion, LEGACY_VERSION,
    StructuredFormat, Turn, Vendor, VersionRegistry, analyze,
};
pub use transcript::parse_transcript;

/// Parse raw conversation content with the built-in formats.
pub fn parse_conversation(content: &str) -> ConversationData {
    parse_with(&FormatRegistry::new(), content)
}

/// Parse raw conversation content with a caller-supplied registry.
#[instrument(skip_all, fields(bytes = content.len()))]
pub fn parse_with(registry: &FormatRegistry, content: &str) -> ConversationData {
    let data = match serde_json::from_str::<Value>(content) {
        Ok(value) => registry.parse(&value),
        Err(e) => {
            debug!(error = %e, "content is not JSON, parsing as transcript");
            parse_transcript(content)
        }
    };
    debug!(
        format = %data.metadata.format,
        messages = data.messages.len(),
        "conversation parsed"
    );
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoreplay_shared::MessageType;
    use serde_json::json;

    fn shape(data: &ConversationData) -> Vec<(MessageType, String)> {
        data.messages
            .iter()
            .map(|m| (m.kind, m.content.clone()))
            .collect()
    }

    #[test]
    fn legacy_vendor_document() {
        let raw = r#"{"conversation_id":"x","history":[[
            {"content":{"Prompt":{"prompt":"hi"}}},
            {"Response":{"content":"yo","message_id":"m1"}}
        ]]}"#;
        let data = parse_conversation(raw);

        assert_eq!(data.metadata.format, "json-qdev-v1");
        assert_eq!(data.messages.len(), 2);
        assert_eq!(data.messages[0].kind, MessageType::Human);
        assert_eq!(data.messages[0].content, "hi");
        assert_eq!(data.messages[1].kind, MessageType::Agent);
        assert_eq!(data.messages[1].content, "yo");
        assert_eq!(data.messages[1].metadata.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn non_json_goes_to_transcript() {
        let data = parse_conversation("> hello\n\nworld");
        assert_eq!(data.metadata.format, "text");
        assert_eq!(data.messages.len(), 2);

        // Truncated JSON is still not JSON.
        let data = parse_conversation(r#"{"conversation_id": "x", "hist"#);
        assert_eq!(data.metadata.format, "text");
    }

    #[test]
    fn json_scalars_go_to_generic() {
        let data = parse_conversation("42");
        assert_eq!(data.metadata.format, "json-generic");
        assert!(data.messages.is_empty());
    }

    #[test]
    fn vendor_output_round_trips_as_generic() {
        let raw = json!({
            "conversation_id": "abc",
            "history": [{
                "user": {"content": {"Prompt": {"prompt": "hi"}}},
                "assistant": {"Response": {"content": "yo", "message_id": "m1"}}
            }]
        })
        .to_string();
        let first = parse_conversation(&raw);
        assert_eq!(first.metadata.format, "json-qdev-v2");

        let serialized = serde_json::to_string(&first).unwrap();
        let second = parse_conversation(&serialized);
        assert_eq!(second.metadata.format, "json-generic");
        assert_eq!(shape(&second), shape(&first));
        assert_eq!(second.messages[1].metadata.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn parsing_is_idempotent() {
        let inputs = [
            "> a\nb\n\nc\n\n[x] > d".to_string(),
            json!({"conversation_id": "x", "history": [[
                {"content": {"Prompt": {"prompt": "p"}}},
                {"ToolUse": {"content": "n", "tool_uses": [{"id": "1", "name": "t", "args": {}}]}}
            ]]})
            .to_string(),
            json!([{"Response": {"content": "r"}}]).to_string(),
            json!({"messages": [{"role": "user", "text": "q"}]}).to_string(),
        ];

        for input in &inputs {
            let a = parse_conversation(input);
            let b = parse_conversation(input);
            assert_eq!(shape(&a), shape(&b));
            assert_eq!(a.metadata.format, b.metadata.format);
            let ids_a: Vec<&str> = a.messages.iter().map(|m| m.id.as_str()).collect();
            let ids_b: Vec<&str> = b.messages.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    #[test]
    fn ambiguous_document_takes_highest_priority() {
        // Matches both the turn-history and generic shapes.
        let raw = json!({
            "conversation_id": "x",
            "history": [],
            "messages": [{"content": "ignored"}]
        })
        .to_string();
        let data = parse_conversation(&raw);
        assert_eq!(data.metadata.format, "json-qdev-v1");
        assert!(data.messages.is_empty());
    }
}
