//! Stored chat messages.

use super::value_object::{MessageBody, UserId};

/// A message accepted by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub room_id: u64,
    /// Strictly increasing within the room, starting at 1
    pub message_id: u64,
    pub sender_id: UserId,
    pub body: MessageBody,
    /// Unix milliseconds
    pub sent_at: i64,
}

/// A slice of a room log, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePage {
    pub items: Vec<ChatMessage>,
    /// Whether messages older than the first item exist
    pub has_next: bool,
}

impl MessagePage {
    /// Cursor for the next older page
    pub fn last_id(&self) -> Option<u64> {
        self.items.first().map(|message| message.message_id)
    }
}
