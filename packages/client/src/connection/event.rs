//! Events observable by consumers of the chat channel.

use crate::domain::{IncomingMessage, RoomId};

use super::state::ConnectionState;

/// Published on the channel's broadcast stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection changed state
    Status(ConnectionState),
    /// A chat message arrived on a subscribed room
    Message(IncomingMessage),
    /// The server acknowledged a room subscription
    Subscribed(RoomId),
    /// The server refused a room subscription
    SubscriptionError { room_id: RoomId, reason: String },
    /// Reconnection keeps failing; drive a persistent banner
    ReconnectStalled { attempts: u32 },
    /// A gap in the room's history could not be re-fetched
    HistoryIncomplete(RoomId),
}
