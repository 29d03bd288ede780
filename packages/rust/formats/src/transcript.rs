//! Line-oriented transcript parser.
//!
//! ```text
//! [vibe] > how do I list files?     <- human turn marker
//! and hidden ones too               <- continuation
//!                                   <- blank line closes the message
//! Use `ls -a`.                      <- agent message
//! ```
//!
//! Every line is either a boundary or content, so parsing cannot fail.

use std::sync::LazyLock;

use regex::Regex;

use convoreplay_shared::{
    ConversationData, ConversationMeta, MessageMeta, MessageType, now_timestamp,
};

use crate::sink::MessageSink;

/// Optional `[tag]` (nested brackets allowed), optional whitespace and
/// punctuation, then a single `>` and any following whitespace.
static HUMAN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[.*?\][\s!?*~+]*)?>\s*").expect("valid human marker regex")
});

/// Strip a human-turn marker, returning the remaining text.
fn strip_marker(line: &str) -> Option<&str> {
    HUMAN_MARKER.find(line).map(|m| &line[m.end()..])
}

struct Pending {
    kind: MessageType,
    lines: Vec<String>,
}

struct TranscriptState {
    sink: MessageSink,
    current: Option<Pending>,
}

impl TranscriptState {
    fn start(&mut self, kind: MessageType, first_line: &str) {
        self.finish();
        self.current = Some(Pending {
            kind,
            lines: vec![first_line.trim().to_string()],
        });
    }

    fn finish(&mut self) {
        if let Some(pending) = self.current.take() {
            self.sink.push(
                pending.kind,
                pending.lines.join("\n"),
                None,
                MessageMeta::default(),
            );
        }
    }
}

/// Parse a plain-text transcript.
pub fn parse_transcript(content: &str) -> ConversationData {
    let mut state = TranscriptState {
        sink: MessageSink::new(),
        current: None,
    };

    for line in content.lines() {
        if let Some(rest) = strip_marker(line) {
            state.start(MessageType::Human, rest);
        } else if line.trim().is_empty() {
            state.finish();
        } else if let Some(pending) = state.current.as_mut() {
            pending.lines.push(line.trim().to_string());
        } else {
            state.start(MessageType::Agent, line);
        }
    }
    state.finish();

    ConversationData {
        metadata: ConversationMeta {
            title: "Text Format Conversation".to_string(),
            timestamp: now_timestamp(),
            format: "text".to_string(),
            source: None,
        },
        messages: state.sink.into_messages(),
    }
}
