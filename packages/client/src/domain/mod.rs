//! Domain layer: chat values and the collaborator interfaces.
//!
//! The collaborator traits are defined here and implemented by the
//! `infrastructure` layer (or by test doubles), so the core never depends on
//! a concrete HTTP client.

pub mod collaborator;
pub mod message;
pub mod read_marker;
pub mod value_object;

pub use collaborator::{CollaboratorError, HistoryClient, LastReadClient, UnreadCounter};
#[cfg(test)]
pub use collaborator::{MockHistoryClient, MockLastReadClient, MockUnreadCounter};
pub use message::{IncomingMessage, Message, MessageState, RoomMessagePage};
pub use read_marker::ReadMarker;
pub use value_object::{ClientTempId, MessageId, RoomId, SenderId, Timestamp, ValueError};
