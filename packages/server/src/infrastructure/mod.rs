//! Infrastructure layer
//!
//! In-memory implementations of the domain interfaces and conversions to the
//! shared wire payloads.

pub mod broker;
pub mod dto;
pub mod repository;

pub use broker::RoomBroker;
pub use repository::InMemoryRoomRepository;
