//! Error types for the chat channel.

use thiserror::Error;

use chatline_shared::protocol::CodecError;

use crate::{
    domain::{CollaboratorError, RoomId, ValueError},
    transport::TransportError,
};

/// Errors returned by the public chat channel API.
///
/// Transport failures are normally absorbed by the reconnect loop and only
/// appear here when an operation cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The connection manager task has stopped
    #[error("connection manager has shut down")]
    Closed,

    /// Too many frames queued while disconnected
    #[error("outbox is full ({0} frames queued)")]
    OutboxFull(usize),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Server rejected the subscription to a room
    #[error("subscription to room {room_id} rejected: {reason}")]
    Subscription { room_id: RoomId, reason: String },

    #[error("history request failed: {0}")]
    History(#[from] CollaboratorError),

    #[error(transparent)]
    Value(#[from] ValueError),

    /// History and live subscription both failed
    #[error("cannot enter room {room_id} (history: {history}; live: {live})")]
    RoomEntry {
        room_id: RoomId,
        history: String,
        live: String,
    },

    #[error("failed to encode payload: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(error: serde_json::Error) -> Self {
        ChannelError::Encode(error.to_string())
    }
}
