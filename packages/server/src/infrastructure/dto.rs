//! Conversions between domain models and the shared wire payloads.

use chatline_shared::protocol::{ChatMessagePayload, MessagePagePayload};

use crate::domain::{ChatMessage, MessagePage};

pub fn message_payload(message: &ChatMessage, client_temp_id: Option<String>) -> ChatMessagePayload {
    ChatMessagePayload {
        room_id: message.room_id,
        message_id: message.message_id,
        sender_id: message.sender_id.as_str().to_string(),
        body: message.body.as_str().to_string(),
        sent_at: message.sent_at,
        client_temp_id,
    }
}

impl From<MessagePage> for MessagePagePayload {
    fn from(page: MessagePage) -> Self {
        let last_id = page.last_id();
        MessagePagePayload {
            items: page
                .items
                .iter()
                .map(|message| message_payload(message, None))
                .collect(),
            last_id,
            has_next: page.has_next,
        }
    }
}
