//! Collaborator traits
//!
//! The chat core consumes these narrow interfaces and never owns network
//! retry for them. Concrete implementations live in `infrastructure`.

use async_trait::async_trait;
use thiserror::Error;

use super::{
    message::RoomMessagePage,
    value_object::{MessageId, RoomId},
};

/// Errors reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Request could not be performed (network, timeout)
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("server responded with status {0}")]
    Status(u16),

    /// Response body could not be interpreted
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Cursor-paginated room history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// Fetch up to `size` messages older than `before_id` (latest page when `None`).
    async fn fetch_page(
        &self,
        room_id: RoomId,
        before_id: Option<MessageId>,
        size: usize,
    ) -> Result<RoomMessagePage, CollaboratorError>;
}

/// Last-read mutation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LastReadClient: Send + Sync {
    async fn set_last_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
    ) -> Result<(), CollaboratorError>;
}

/// Unread-count query cache. The core only marks it stale.
#[cfg_attr(test, mockall::automock)]
pub trait UnreadCounter: Send + Sync {
    fn invalidate(&self, room_id: RoomId);
}
