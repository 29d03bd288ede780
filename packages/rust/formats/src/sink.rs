//! Ordered message emission with monotonic id assignment.

use convoreplay_shared::{Message, MessageMeta, MessageType, now_timestamp};

/// Collects messages for one parse, numbering them `1, 2, 3, ...`.
#[derive(Debug)]
pub(crate) struct MessageSink {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageSink {
    pub(crate) fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Emit a message. A missing timestamp is stamped with the current time.
    pub(crate) fn push(
        &mut self,
        kind: MessageType,
        content: impl Into<String>,
        timestamp: Option<&str>,
        metadata: MessageMeta,
    ) {
        let id = self.next_id;
        self.next_id += 1;

        self.messages.push(Message {
            id: id.to_string(),
            kind,
            content: content.into(),
            timestamp: timestamp.map_or_else(now_timestamp, str::to_string),
            metadata,
        });
    }

    pub(crate) fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
