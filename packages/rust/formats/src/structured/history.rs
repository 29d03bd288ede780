//! Versioned turn-based vendor schema (`conversation_id` + `history`).
//!
//! Two incompatible history-entry shapes exist in the wild:
//! - `v1-array`: each entry is `[userTurn, assistantTurn]`
//! - `v2-object`: each entry is `{ "user": ..., "assistant": ... }`
//!
//! The shape of the first entry decides the version. Versions live in a
//! [`VersionRegistry`] keyed by tag, so a new shape only needs a new
//! [`HistoryVersion`] implementation.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use convoreplay_shared::{ConversationData, ConversationMeta, now_timestamp};

use super::StructuredFormat;
use super::turns::{Turn, extract_turn};
use crate::sink::MessageSink;

/// Version tag of the legacy array-pair shape.
pub const LEGACY_VERSION: &str = "v1-array";

/// Version tag of the named-field shape.
pub const CURRENT_VERSION: &str = "v2-object";

// ---------------------------------------------------------------------------
// Document envelope
// ---------------------------------------------------------------------------

/// Conversation identifier; accepted as a string or a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConversationId {
    Text(String),
    Number(serde_json::Number),
}

impl ConversationId {
    fn into_source(self) -> Option<String> {
        match self {
            Self::Text(s) if s.is_empty() => None,
            Self::Text(s) => Some(s),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

/// Decode the envelope; `None` unless both fields are present and usable.
fn decode_document(value: &Value) -> Option<(String, &[Value])> {
    let id = value.get("conversation_id")?;
    let source = ConversationId::deserialize(id).ok()?.into_source()?;
    let history = value.get("history")?.as_array()?;
    Some((source, history.as_slice()))
}

// ---------------------------------------------------------------------------
// Version trait + built-ins
// ---------------------------------------------------------------------------

/// One history-entry shape.
pub trait HistoryVersion: Send + Sync {
    /// Registry key (e.g. `v1-array`).
    fn version(&self) -> &str;

    /// Format tag written into [`ConversationMeta::format`].
    fn format_tag(&self) -> &str;

    /// Conversation title for data produced by this version.
    fn title(&self) -> &str;

    /// Does the first history entry have this version's shape?
    fn matches(&self, first_entry: &Value) -> bool;

    /// Normalize one entry. Entries missing either half yield `None` and are
    /// skipped without partial emission.
    fn unpack<'a>(&self, entry: &'a Value) -> Option<Turn<'a>>;
}

/// `[userTurn, assistantTurn]` entries.
pub struct LegacyHistory;

impl HistoryVersion for LegacyHistory {
    fn version(&self) -> &str {
        LEGACY_VERSION
    }

    fn format_tag(&self) -> &str {
        "json-qdev-v1"
    }

    fn title(&self) -> &str {
        "Q-Developer Conversation (V1)"
    }

    fn matches(&self, first_entry: &Value) -> bool {
        first_entry.is_array()
    }

    fn unpack<'a>(&self, entry: &'a Value) -> Option<Turn<'a>> {
        match entry.as_array()?.as_slice() {
            [user, assistant, ..] => Some(Turn { user, assistant }),
            _ => None,
        }
    }
}

/// `{ "user": ..., "assistant": ... }` entries.
pub struct CurrentHistory;

impl HistoryVersion for CurrentHistory {
    fn version(&self) -> &str {
        CURRENT_VERSION
    }

    fn format_tag(&self) -> &str {
        "json-qdev-v2"
    }

    fn title(&self) -> &str {
        "Q-Developer Conversation (V2)"
    }

    fn matches(&self, first_entry: &Value) -> bool {
        self.unpack(first_entry).is_some()
    }

    fn unpack<'a>(&self, entry: &'a Value) -> Option<Turn<'a>> {
        let user = entry.get("user").filter(|v| is_truthy(v))?;
        let assistant = entry.get("assistant").filter(|v| is_truthy(v))?;
        Some(Turn { user, assistant })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// VersionRegistry
// ---------------------------------------------------------------------------

/// Known history versions; the first registered version is the fallback.
pub struct VersionRegistry {
    versions: Vec<Box<dyn HistoryVersion>>,
}

impl VersionRegistry {
    /// Registry with the built-in versions (legacy is the fallback).
    pub fn new() -> Self {
        Self {
            versions: vec![Box::new(LegacyHistory), Box::new(CurrentHistory)],
        }
    }

    /// Add a version. It is consulted before the built-ins; a version with an
    /// existing tag replaces it in place.
    pub fn register(&mut self, version: Box<dyn HistoryVersion>) {
        if let Some(slot) = self
            .versions
            .iter_mut()
            .find(|v| v.version() == version.version())
        {
            *slot = version;
            return;
        }
        let at = 1.min(self.versions.len());
        self.versions.insert(at, version);
    }

    /// Look up a version by tag.
    pub fn get(&self, tag: &str) -> Option<&dyn HistoryVersion> {
        self.versions
            .iter()
            .find(|v| v.version() == tag)
            .map(|v| v.as_ref())
    }

    /// All registered version tags.
    pub fn versions(&self) -> Vec<&str> {
        self.versions.iter().map(|v| v.version()).collect()
    }

    /// Resolve the version for a history from the shape of its first entry.
    /// Empty or unrecognized histories resolve to the fallback version.
    pub fn detect(&self, history: &[Value]) -> &dyn HistoryVersion {
        let fallback = self.versions[0].as_ref();
        let Some(first) = history.first() else {
            return fallback;
        };

        self.versions[1..]
            .iter()
            .map(|v| v.as_ref())
            .find(|v| v.matches(first))
            .unwrap_or(fallback)
    }
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StructuredFormat
// ---------------------------------------------------------------------------

/// Detects the envelope and delegates entries to the resolved version.
pub struct HistoryFormat {
    registry: VersionRegistry,
}

impl HistoryFormat {
    pub fn new() -> Self {
        Self::with_registry(VersionRegistry::new())
    }

    pub fn with_registry(registry: VersionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Resolve the version tag for a document, if it is this format at all.
    pub fn detect_version(&self, value: &Value) -> Option<&str> {
        let (_, history) = decode_document(value)?;
        Some(self.registry.detect(history).version())
    }
}

impl Default for HistoryFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuredFormat for HistoryFormat {
    fn detect(&self, value: &Value) -> bool {
        decode_document(value).is_some()
    }

    fn parse(&self, value: &Value) -> ConversationData {
        let (source, history) = decode_document(value).unwrap_or_default();
        let version = self.registry.detect(history);
        debug!(version = version.version(), entries = history.len(), "parsing turn history");

        let mut sink = MessageSink::new();
        for entry in history {
            match version.unpack(entry) {
                Some(turn) => extract_turn(turn, &mut sink),
                None => debug!("skipping incomplete history entry"),
            }
        }

        ConversationData {
            metadata: ConversationMeta {
                title: version.title().to_string(),
                timestamp: now_timestamp(),
                format: version.format_tag().to_string(),
                source: (!source.is_empty()).then_some(source),
            },
            messages: sink.into_messages(),
        }
    }

    fn name(&self) -> &str {
        "turn-history"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoreplay_shared::MessageType;
    use serde_json::json;

    #[test]
    fn envelope_requires_id_and_history_array() {
        let format = HistoryFormat::new();
        assert!(format.detect(&json!({"conversation_id": "x", "history": []})));
        assert!(format.detect(&json!({"conversation_id": 7, "history": []})));
        assert!(!format.detect(&json!({"conversation_id": "", "history": []})));
        assert!(!format.detect(&json!({"conversation_id": "x", "history": {}})));
        assert!(!format.detect(&json!({"history": []})));
        assert!(!format.detect(&json!([1, 2])));
    }

    #[test]
    fn version_from_first_entry_shape() {
        let format = HistoryFormat::new();

        let legacy = json!({"conversation_id": "x", "history": [[{}, {}]]});
        assert_eq!(format.detect_version(&legacy), Some(LEGACY_VERSION));

        let current = json!({"conversation_id": "x", "history": [{"user": {}, "assistant": {}}]});
        assert_eq!(format.detect_version(&current), Some(CURRENT_VERSION));

        let empty = json!({"conversation_id": "x", "history": []});
        assert_eq!(format.detect_version(&empty), Some(LEGACY_VERSION));

        let odd = json!({"conversation_id": "x", "history": [{"user": {}}]});
        assert_eq!(format.detect_version(&odd), Some(LEGACY_VERSION));
    }

    #[test]
    fn legacy_document_parses() {
        let doc = json!({
            "conversation_id": "x",
            "history": [[
                {"content": {"Prompt": {"prompt": "hi"}}},
                {"Response": {"content": "yo", "message_id": "m1"}}
            ]]
        });
        let data = HistoryFormat::new().parse(&doc);

        assert_eq!(data.metadata.format, "json-qdev-v1");
        assert_eq!(data.metadata.source.as_deref(), Some("x"));
        assert_eq!(data.messages.len(), 2);
        assert_eq!(data.messages[0].kind, MessageType::Human);
        assert_eq!(data.messages[0].content, "hi");
        assert_eq!(data.messages[1].kind, MessageType::Agent);
        assert_eq!(data.messages[1].content, "yo");
        assert_eq!(data.messages[1].metadata.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn current_document_parses() {
        let doc = json!({
            "conversation_id": "abc",
            "history": [
                {
                    "user": {"content": {"Prompt": {"prompt": "read it"}}},
                    "assistant": {"ToolUse": {"tool_uses": [
                        {"id": "t1", "name": "fs_read", "args": {}}
                    ]}}
                },
                {
                    "user": {"content": {"ToolUseResults": {"tool_use_results": [
                        {"tool_use_id": "t1", "content": [], "status": "Success"}
                    ]}}},
                    "assistant": {"Response": {"content": "done", "message_id": "m2"}}
                }
            ]
        });
        let data = HistoryFormat::new().parse(&doc);

        assert_eq!(data.metadata.format, "json-qdev-v2");
        assert_eq!(data.metadata.title, "Q-Developer Conversation (V2)");
        let kinds: Vec<MessageType> = data.messages.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageType::Human,
                MessageType::ToolCall,
                MessageType::ToolCall,
                MessageType::Agent
            ]
        );
        let ids: Vec<&str> = data.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn incomplete_entries_are_skipped_whole() {
        let doc = json!({
            "conversation_id": "x",
            "history": [
                [{"content": {"Prompt": {"prompt": "orphan"}}}],
                [{"content": {"Prompt": {"prompt": "kept"}}}, {}]
            ]
        });
        let data = HistoryFormat::new().parse(&doc);
        assert_eq!(data.messages.len(), 1);
        assert_eq!(data.messages[0].content, "kept");
    }

    #[test]
    fn current_entries_missing_a_half_are_skipped() {
        let doc = json!({
            "conversation_id": "x",
            "history": [
                {"user": {"content": {"Prompt": {"prompt": "a"}}}, "assistant": {}},
                {"user": {"content": {"Prompt": {"prompt": "b"}}}}
            ]
        });
        let data = HistoryFormat::new().parse(&doc);
        assert_eq!(data.metadata.format, "json-qdev-v2");
        assert_eq!(data.messages.len(), 1);
        assert_eq!(data.messages[0].content, "a");
    }

    struct TaggedHistory;

    impl HistoryVersion for TaggedHistory {
        fn version(&self) -> &str {
            "v3-tagged"
        }
        fn format_tag(&self) -> &str {
            "json-qdev-v3"
        }
        fn title(&self) -> &str {
            "Tagged"
        }
        fn matches(&self, first_entry: &Value) -> bool {
            first_entry.get("turn").is_some()
        }
        fn unpack<'a>(&self, entry: &'a Value) -> Option<Turn<'a>> {
            let turn = entry.get("turn")?;
            Some(Turn {
                user: turn.get("u")?,
                assistant: turn.get("a")?,
            })
        }
    }

    #[test]
    fn registered_versions_take_part_in_detection() {
        let mut registry = VersionRegistry::new();
        registry.register(Box::new(TaggedHistory));
        assert!(registry.get("v3-tagged").is_some());
        assert_eq!(registry.versions()[0], LEGACY_VERSION);

        let format = HistoryFormat::with_registry(registry);
        let doc = json!({
            "conversation_id": "x",
            "history": [{"turn": {"u": {"content": {"Prompt": {"prompt": "q"}}}, "a": {}}}]
        });
        assert_eq!(format.detect_version(&doc), Some("v3-tagged"));

        let data = format.parse(&doc);
        assert_eq!(data.metadata.format, "json-qdev-v3");
        assert_eq!(data.messages.len(), 1);
    }
}
