//! Domain layer of the development broker
//!
//! Room logs with per-user read markers, and the interfaces (repository,
//! publisher) the use cases depend on. Concrete implementations live in the
//! infrastructure layer.

pub mod message;
pub mod repository;
pub mod room;
pub mod value_object;

pub use message::{ChatMessage, MessagePage};
#[cfg(test)]
pub use repository::{MockMessagePublisher, MockRoomRepository};
pub use repository::{MessagePublisher, RepositoryError, RoomRepository};
pub use room::RoomLog;
pub use value_object::{MessageBody, UserId, ValueError};
