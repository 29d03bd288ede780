//! Canonical conversation and context types.
//!
//! Every parser produces [`ConversationData`]; every source adapter produces
//! [`ContextItem`]s. These are the only structures presentation layers see.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Open metadata values
// ---------------------------------------------------------------------------

/// Restricted value union for open-ended metadata extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl MetaValue {
    /// Convert a scalar JSON value; arrays, objects and null have no representation.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => Some(Self::Number(n.clone())),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who (or what) produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Human,
    Agent,
    ToolCall,
    System,
}

impl MessageType {
    /// Parse the canonical lowercase tag (`human`, `agent`, `tool_call`, `system`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            "tool_call" => Some(Self::ToolCall),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::ToolCall => "tool_call",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of structured tool record a `tool_call` message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRecordKind {
    Use,
    Result,
    Cancelled,
}

/// Message metadata: known fields plus an open extension map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ToolRecordKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Vendor response identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Cancellation reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

impl MessageMeta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sequence number, string-encoded.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Text; `tool_call` messages carry a serialized tool record.
    pub content: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "MessageMeta::is_empty")]
    pub metadata: MessageMeta,
}

// ---------------------------------------------------------------------------
// ConversationData
// ---------------------------------------------------------------------------

/// Conversation-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub title: String,
    pub timestamp: String,
    /// Tag of the parser that produced the data (diagnostics only).
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The normalized output of every parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationData {
    pub metadata: ConversationMeta,
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// ContextItem
// ---------------------------------------------------------------------------

/// Category of an auxiliary context file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Image,
    Video,
    Document,
    Code,
    Audio,
    Other,
}

impl ContextKind {
    /// Textual kinds are the only ones worth prefetching.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Document | Self::Code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Code => "code",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation metadata for a context item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Syntax-highlighting language (code items only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

impl ContextMeta {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(mut self, other: ContextMeta) -> Self {
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.mime_type.is_some() {
            self.mime_type = other.mime_type;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.language.is_some() {
            self.language = other.language;
        }
        self.extra.extend(other.extra);
        self
    }
}

/// An auxiliary file attached to one or more message positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContextKind,
    pub url: String,
    pub filename: String,
    /// 1-based message positions, derived from `filename`.
    pub message_range: BTreeSet<u32>,
    #[serde(default)]
    pub metadata: ContextMeta,
}

impl ContextItem {
    /// Earliest message position this item applies to.
    pub fn first_message(&self) -> Option<u32> {
        self.message_range.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_type_tag() {
        let msg = Message {
            id: "1".into(),
            kind: MessageType::ToolCall,
            content: "{}".into(),
            timestamp: now_timestamp(),
            metadata: MessageMeta {
                tool_id: Some("t1".into()),
                tool_type: Some(ToolRecordKind::Result),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["metadata"]["toolId"], "t1");
        assert_eq!(json["metadata"]["toolType"], "result");
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let msg = Message {
            id: "1".into(),
            kind: MessageType::Human,
            content: "hi".into(),
            timestamp: now_timestamp(),
            metadata: MessageMeta::default(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn meta_extension_values() {
        let mut meta = MessageMeta::default();
        meta.extra.insert("turn".into(), MetaValue::Number(3.into()));
        meta.extra.insert("edited".into(), MetaValue::Bool(true));

        let json = serde_json::to_string(&meta).expect("serialize");
        let parsed: MessageMeta = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.extra.get("turn"), Some(&MetaValue::Number(3.into())));
        assert_eq!(parsed.extra.get("edited"), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn context_meta_merge_prefers_overlay() {
        let base = ContextMeta {
            mime_type: Some("text/plain".into()),
            language: Some("text".into()),
            ..Default::default()
        };
        let overlay = ContextMeta {
            size: Some(42),
            language: Some("rust".into()),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.size, Some(42));
        assert_eq!(merged.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(merged.language.as_deref(), Some("rust"));
    }

    #[test]
    fn textual_kinds() {
        assert!(ContextKind::Code.is_textual());
        assert!(ContextKind::Document.is_textual());
        assert!(!ContextKind::Image.is_textual());
        assert!(!ContextKind::Other.is_textual());
    }
}
