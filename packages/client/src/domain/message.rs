//! Chat message entities.

use super::value_object::{ClientTempId, MessageId, RoomId, SenderId, Timestamp};

/// Delivery state of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageState {
    /// Sent by this client, waiting for the server echo
    Pending(ClientTempId),
    /// Could not be handed to the connection (e.g. outbox full)
    Failed(ClientTempId),
    /// Assigned an id by the server
    Confirmed(MessageId),
}

/// A chat message as shown to the viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub room_id: RoomId,
    pub state: MessageState,
    pub sender_id: SenderId,
    pub body: String,
    pub sent_at: Timestamp,
}

impl Message {
    pub fn confirmed(
        room_id: RoomId,
        message_id: MessageId,
        sender_id: SenderId,
        body: String,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            room_id,
            state: MessageState::Confirmed(message_id),
            sender_id,
            body,
            sent_at,
        }
    }

    pub fn pending(
        room_id: RoomId,
        temp_id: ClientTempId,
        sender_id: SenderId,
        body: String,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            room_id,
            state: MessageState::Pending(temp_id),
            sender_id,
            body,
            sent_at,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self.state {
            MessageState::Confirmed(id) => Some(id),
            _ => None,
        }
    }

    pub fn temp_id(&self) -> Option<&ClientTempId> {
        match &self.state {
            MessageState::Pending(id) | MessageState::Failed(id) => Some(id),
            MessageState::Confirmed(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, MessageState::Pending(_))
    }

    /// Same author and same text.
    pub fn same_content(&self, other: &Message) -> bool {
        self.sender_id == other.sender_id && self.body == other.body
    }
}

/// A server-confirmed message pushed over the live channel.
///
/// `client_temp_id` is set only on the echo of a message this client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message: Message,
    pub message_id: MessageId,
    pub client_temp_id: Option<ClientTempId>,
}

impl IncomingMessage {
    pub fn new(message: Message, client_temp_id: Option<ClientTempId>) -> Option<Self> {
        let message_id = message.message_id()?;
        Some(Self {
            message,
            message_id,
            client_temp_id,
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.message.room_id
    }
}

/// One page from the history collaborator, items ascending by id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomMessagePage {
    pub items: Vec<Message>,
    /// Cursor for the next older page
    pub last_id: Option<MessageId>,
    pub has_next: bool,
}
