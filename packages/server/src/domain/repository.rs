//! Interfaces the use cases depend on.

use async_trait::async_trait;
use thiserror::Error;

use super::{
    message::{ChatMessage, MessagePage},
    value_object::{MessageBody, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("message {message_id} does not exist in room {room_id}")]
    MessageNotFound { room_id: u64, message_id: u64 },
}

/// Room log storage
///
/// Rooms are created on first use, so reads of an unknown room see an empty
/// log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Store a message and assign its id.
    async fn append_message(
        &self,
        room_id: u64,
        sender_id: UserId,
        body: MessageBody,
        sent_at: i64,
    ) -> ChatMessage;

    async fn fetch_page(&self, room_id: u64, before_id: Option<u64>, size: usize) -> MessagePage;

    /// Returns the user's marker after the update.
    async fn set_last_read(
        &self,
        room_id: u64,
        user_id: UserId,
        message_id: u64,
    ) -> Result<u64, RepositoryError>;

    async fn unread_count(&self, room_id: u64, user_id: &UserId) -> u64;
}

/// Fan-out of accepted messages to live subscribers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Deliver to every subscriber of the message's room, echoing the
    /// sender's temporary id. Returns the number of deliveries.
    async fn publish(&self, message: &ChatMessage, client_temp_id: Option<String>) -> usize;
}
