//! Room log entity.

use std::collections::HashMap;

use super::{
    message::{ChatMessage, MessagePage},
    repository::RepositoryError,
    value_object::{MessageBody, UserId},
};

/// Append-only message log of one room plus its members' read markers
#[derive(Debug, Clone, Default)]
pub struct RoomLog {
    room_id: u64,
    messages: Vec<ChatMessage>,
    last_read: HashMap<UserId, u64>,
}

impl RoomLog {
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            ..Self::default()
        }
    }

    pub fn latest_id(&self) -> Option<u64> {
        self.messages.last().map(|message| message.message_id)
    }

    /// Append a message with the next id.
    pub fn append(&mut self, sender_id: UserId, body: MessageBody, sent_at: i64) -> ChatMessage {
        let message = ChatMessage {
            room_id: self.room_id,
            message_id: self.latest_id().map_or(1, |id| id + 1),
            sender_id,
            body,
            sent_at,
        };
        self.messages.push(message.clone());
        message
    }

    /// Up to `size` messages older than `before_id` (or the newest ones),
    /// oldest first.
    pub fn page(&self, before_id: Option<u64>, size: usize) -> MessagePage {
        let end = match before_id {
            Some(before_id) => self
                .messages
                .partition_point(|message| message.message_id < before_id),
            None => self.messages.len(),
        };
        let start = end.saturating_sub(size);
        MessagePage {
            items: self.messages[start..end].to_vec(),
            has_next: start > 0,
        }
    }

    /// Move the user's marker forward. Returns the marker after the update.
    pub fn mark_read(&mut self, user_id: UserId, message_id: u64) -> Result<u64, RepositoryError> {
        if self.latest_id().is_none_or(|latest| message_id > latest) {
            return Err(RepositoryError::MessageNotFound {
                room_id: self.room_id,
                message_id,
            });
        }
        let marker = self.last_read.entry(user_id).or_insert(0);
        *marker = (*marker).max(message_id);
        Ok(*marker)
    }

    pub fn last_read(&self, user_id: &UserId) -> Option<u64> {
        self.last_read.get(user_id).copied()
    }

    /// Messages from other users after the user's marker
    pub fn unread_count(&self, user_id: &UserId) -> u64 {
        let marker = self.last_read(user_id).unwrap_or(0);
        self.messages
            .iter()
            .filter(|message| message.message_id > marker && &message.sender_id != user_id)
            .count() as u64
    }
}
