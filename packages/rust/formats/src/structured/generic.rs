//! Generic `{ title?, timestamp?, messages: [...] }` documents.
//!
//! This is the catch-all: any structured document reaches it when no vendor
//! shape matched, so every field is optional and a missing `messages` array
//! simply yields an empty conversation.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use convoreplay_shared::{
    ConversationData, ConversationMeta, Message, MessageMeta, MessageType, MetaValue,
    ToolRecordKind, now_timestamp,
};

use super::StructuredFormat;

pub struct GenericFormat;

/// One entry of the `messages` array. Fields are kept as raw values so a
/// wrongly-typed field degrades that field only.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenericMessage {
    id: Value,
    #[serde(rename = "type")]
    kind: Value,
    role: Value,
    sender: Value,
    content: Value,
    text: Value,
    timestamp: Value,
    metadata: Value,
}

impl GenericMessage {
    fn id(&self, position: usize) -> String {
        match &self.id {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => position.to_string(),
        }
    }

    fn kind(&self) -> MessageType {
        self.kind
            .as_str()
            .and_then(MessageType::from_tag)
            .unwrap_or_else(|| self.infer_kind())
    }

    /// Role inference from common field-name conventions.
    fn infer_kind(&self) -> MessageType {
        let role = self.role.as_str();
        let sender = self.sender.as_str();

        if role == Some("user") || sender == Some("user") {
            MessageType::Human
        } else if role == Some("assistant") || sender == Some("assistant") {
            MessageType::Agent
        } else if role == Some("tool") {
            MessageType::ToolCall
        } else if role == Some("system") || sender == Some("system") {
            MessageType::System
        } else {
            MessageType::Agent
        }
    }

    fn content(&self) -> String {
        [&self.content, &self.text]
            .into_iter()
            .find_map(|v| match v {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .unwrap_or_default()
    }

    fn timestamp(&self) -> String {
        self.timestamp
            .as_str()
            .filter(|s| !s.is_empty())
            .map_or_else(now_timestamp, str::to_string)
    }

    fn metadata(&self) -> MessageMeta {
        lenient_meta(&self.metadata)
    }
}

/// Known keys of a serialized [`MessageMeta`].
const KNOWN_META_KEYS: &[&str] =
    &["toolName", "toolId", "toolType", "status", "messageId", "reason"];

/// Read message metadata key by key. A wrongly-typed known field is dropped
/// on its own; extension values that are not scalars are skipped.
fn lenient_meta(value: &Value) -> MessageMeta {
    let Some(map) = value.as_object() else {
        return MessageMeta::default();
    };
    let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

    MessageMeta {
        tool_name: text("toolName"),
        tool_id: text("toolId"),
        tool_type: map
            .get("toolType")
            .and_then(|v| ToolRecordKind::deserialize(v).ok()),
        status: text("status"),
        message_id: text("messageId"),
        reason: text("reason"),
        extra: map
            .iter()
            .filter(|(key, _)| !KNOWN_META_KEYS.contains(&key.as_str()))
            .filter_map(|(key, v)| MetaValue::from_json(v).map(|v| (key.clone(), v)))
            .collect(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenericDocument {
    title: Value,
    timestamp: Value,
    messages: Value,
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

impl StructuredFormat for GenericFormat {
    fn detect(&self, _value: &Value) -> bool {
        true
    }

    fn parse(&self, value: &Value) -> ConversationData {
        let doc = GenericDocument::deserialize(value).unwrap_or_default();

        let messages: Vec<Message> = doc
            .messages
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let msg = GenericMessage::deserialize(raw).unwrap_or_default();
                Message {
                    id: msg.id(index + 1),
                    kind: msg.kind(),
                    content: msg.content(),
                    timestamp: msg.timestamp(),
                    metadata: msg.metadata(),
                }
            })
            .collect();
        debug!(messages = messages.len(), "parsed generic document");

        ConversationData {
            metadata: ConversationMeta {
                title: non_empty_str(&doc.title)
                    .unwrap_or("JSON Conversation")
                    .to_string(),
                timestamp: non_empty_str(&doc.timestamp)
                    .map_or_else(now_timestamp, str::to_string),
                format: "json-generic".to_string(),
                source: None,
            },
            messages,
        }
    }

    fn name(&self) -> &str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_are_inferred() {
        let doc = json!({"messages": [
            {"role": "user", "content": "a"},
            {"sender": "assistant", "content": "b"},
            {"role": "tool", "content": "c"},
            {"role": "system", "content": "d"},
            {"role": "narrator", "content": "e"},
            {"content": "f"}
        ]});
        let kinds: Vec<MessageType> = GenericFormat
            .parse(&doc)
            .messages
            .iter()
            .map(|m| m.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                MessageType::Human,
                MessageType::Agent,
                MessageType::ToolCall,
                MessageType::System,
                MessageType::Agent,
                MessageType::Agent
            ]
        );
    }

    #[test]
    fn explicit_type_wins_over_role() {
        let doc = json!({"messages": [
            {"type": "system", "role": "user", "content": "x"},
            {"type": "bogus", "role": "user", "content": "y"}
        ]});
        let data = GenericFormat.parse(&doc);
        assert_eq!(data.messages[0].kind, MessageType::System);
        assert_eq!(data.messages[1].kind, MessageType::Human);
    }

    #[test]
    fn ids_default_to_position() {
        let doc = json!({"messages": [
            {"content": "a"},
            {"id": "m-7", "content": "b"},
            {"id": 42, "content": "c"}
        ]});
        let ids: Vec<String> = GenericFormat
            .parse(&doc)
            .messages
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["1", "m-7", "42"]);
    }

    #[test]
    fn content_falls_back_to_text() {
        let doc = json!({"messages": [
            {"text": "from text"},
            {"content": {"nested": true}},
            {}
        ]});
        let data = GenericFormat.parse(&doc);
        assert_eq!(data.messages[0].content, "from text");
        assert_eq!(data.messages[1].content, r#"{"nested":true}"#);
        assert_eq!(data.messages[2].content, "");
    }

    #[test]
    fn document_metadata_is_honored() {
        let doc = json!({
            "title": "Pairing session",
            "timestamp": "2025-01-02T03:04:05Z",
            "messages": [{"timestamp": "2025-01-02T03:05:00Z", "content": "hi"}]
        });
        let data = GenericFormat.parse(&doc);
        assert_eq!(data.metadata.title, "Pairing session");
        assert_eq!(data.metadata.timestamp, "2025-01-02T03:04:05Z");
        assert_eq!(data.metadata.format, "json-generic");
        assert_eq!(data.messages[0].timestamp, "2025-01-02T03:05:00Z");
    }

    #[test]
    fn anything_else_is_an_empty_conversation() {
        for doc in [json!(42), json!("text"), json!([1, 2]), json!({"messages": "no"})] {
            let data = GenericFormat.parse(&doc);
            assert!(data.messages.is_empty());
            assert_eq!(data.metadata.title, "JSON Conversation");
        }
    }

    #[test]
    fn message_metadata_survives() {
        let doc = json!({"messages": [
            {"type": "agent", "content": "yo", "metadata": {"messageId": "m1"}}
        ]});
        let data = GenericFormat.parse(&doc);
        assert_eq!(data.messages[0].metadata.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn nested_metadata_keeps_known_fields() {
        let doc = json!({"messages": [{
            "type": "agent",
            "content": "yo",
            "metadata": {
                "messageId": "m1",
                "toolType": "result",
                "usage": {"tokens": 3},
                "tags": ["a"],
                "model": "q",
                "cached": true,
                "status": 5
            }
        }]});
        let data = GenericFormat.parse(&doc);
        let meta = &data.messages[0].metadata;

        assert_eq!(meta.message_id.as_deref(), Some("m1"));
        assert_eq!(meta.tool_type, Some(ToolRecordKind::Result));
        assert!(meta.status.is_none());
        assert_eq!(meta.extra.len(), 2);
        assert_eq!(meta.extra["model"], MetaValue::from("q"));
        assert_eq!(meta.extra["cached"], MetaValue::Bool(true));
    }
}
