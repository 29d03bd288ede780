//! Turn extraction shared by every vendor schema version.
//!
//! Each version first normalizes its history entries into a [`Turn`]; from
//! there the same functions expand user and assistant halves into messages.
//! Blocks are decoded independently, so a malformed block is skipped without
//! affecting its siblings.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use convoreplay_shared::{MessageMeta, MessageType, ToolRecordKind};

use crate::sink::MessageSink;

/// One history entry, normalized to its two halves.
#[derive(Debug, Clone, Copy)]
pub struct Turn<'a> {
    pub user: &'a Value,
    pub assistant: &'a Value,
}

// ---------------------------------------------------------------------------
// Wire blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PromptBlock {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct ToolUseBlock {
    #[serde(default)]
    content: Value,
    /// Decoded entry by entry with [`entries`].
    #[serde(default)]
    tool_uses: Value,
}

#[derive(Debug, Deserialize)]
struct ToolUse {
    #[serde(default)]
    name: Value,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
struct ToolResultsBlock {
    /// Decoded entry by entry with [`entries`].
    #[serde(default)]
    tool_use_results: Value,
}

#[derive(Debug, Deserialize)]
struct ToolResult {
    #[serde(default)]
    tool_use_id: Value,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    status: Value,
}

#[derive(Debug, Deserialize)]
struct CancelledBlock {
    #[serde(default)]
    prompt: Value,
    #[serde(default)]
    tool_use_results: Value,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    message_id: Value,
}

/// Decode `parent[key]` as `T`; absent, null or mis-shaped blocks yield `None`.
fn block<T: DeserializeOwned>(parent: &Value, key: &str) -> Option<T> {
    parent.get(key).and_then(|v| T::deserialize(v).ok())
}

/// Decode each element of a list as `T`, skipping the ones that do not fit.
/// A missing, null or non-array list is empty.
fn entries<T: DeserializeOwned>(list: &Value) -> Vec<T> {
    list.as_array()
        .map(|items| items.iter().filter_map(|v| T::deserialize(v).ok()).collect())
        .unwrap_or_default()
}

fn timestamp_of(turn: &Value) -> Option<&str> {
    turn.get("timestamp").and_then(Value::as_str)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_of(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Expand both halves of a turn, user first.
pub(crate) fn extract_turn(turn: Turn<'_>, sink: &mut MessageSink) {
    extract_user_turn(turn.user, sink);
    extract_assistant_turn(turn.assistant, sink);
}

/// A prompt yields one human message; embedded tool results yield one
/// `tool_call` message each.
pub(crate) fn extract_user_turn(user: &Value, sink: &mut MessageSink) {
    let ts = timestamp_of(user);
    let Some(content) = user.get("content") else {
        return;
    };

    if let Some(prompt) = block::<PromptBlock>(content, "Prompt") {
        if !prompt.prompt.is_empty() {
            sink.push(MessageType::Human, prompt.prompt, ts, MessageMeta::default());
        }
    }

    extract_tool_results(content, ts, sink);
}

/// Tool invocations, tool results, cancellations and direct responses, in
/// that order.
pub(crate) fn extract_assistant_turn(assistant: &Value, sink: &mut MessageSink) {
    let ts = timestamp_of(assistant);

    if let Some(tool_use) = block::<ToolUseBlock>(assistant, "ToolUse") {
        if let Some(narrative) = tool_use.content.as_str().filter(|c| !c.is_empty()) {
            sink.push(MessageType::Agent, narrative, ts, MessageMeta::default());
        }

        for tool in entries::<ToolUse>(&tool_use.tool_uses) {
            let record = json!({
                "type": "tool_use",
                "name": tool.name,
                "args": tool.args,
                "id": tool.id,
            });
            sink.push(
                MessageType::ToolCall,
                record.to_string(),
                ts,
                MessageMeta {
                    tool_name: str_of(&tool.name),
                    tool_id: str_of(&tool.id),
                    tool_type: Some(ToolRecordKind::Use),
                    ..Default::default()
                },
            );
        }
    }

    if let Some(content) = assistant.get("content") {
        extract_tool_results(content, ts, sink);
        extract_cancellation(content, ts, sink);
    }

    extract_response(assistant, ts, sink);
}

/// `ToolUseResults` block under `container`, one message per result.
pub(crate) fn extract_tool_results(container: &Value, ts: Option<&str>, sink: &mut MessageSink) {
    let Some(results) = block::<ToolResultsBlock>(container, "ToolUseResults") else {
        return;
    };

    for result in entries::<ToolResult>(&results.tool_use_results) {
        let record = json!({
            "type": "tool_result",
            "tool_use_id": result.tool_use_id,
            "content": result.content,
            "status": result.status,
        });
        sink.push(
            MessageType::ToolCall,
            record.to_string(),
            ts,
            MessageMeta {
                tool_id: str_of(&result.tool_use_id),
                tool_type: Some(ToolRecordKind::Result),
                status: str_of(&result.status),
                ..Default::default()
            },
        );
    }
}

fn extract_cancellation(container: &Value, ts: Option<&str>, sink: &mut MessageSink) {
    let Some(cancelled) = block::<CancelledBlock>(container, "CancelledToolUses") else {
        return;
    };

    let record = json!({
        "type": "tool_cancelled",
        "prompt": cancelled.prompt,
        "tool_use_results": cancelled.tool_use_results,
    });
    sink.push(
        MessageType::ToolCall,
        record.to_string(),
        ts,
        MessageMeta {
            tool_type: Some(ToolRecordKind::Cancelled),
            reason: str_of(&cancelled.prompt),
            ..Default::default()
        },
    );
}

/// `Response` block directly under `container`, one agent message.
pub(crate) fn extract_response(container: &Value, ts: Option<&str>, sink: &mut MessageSink) {
    let Some(response) = block::<ResponseBlock>(container, "Response") else {
        return;
    };

    sink.push(
        MessageType::Agent,
        text_of(&response.content),
        ts,
        MessageMeta {
            message_id: str_of(&response.message_id),
            ..Default::default()
        },
    );
}
