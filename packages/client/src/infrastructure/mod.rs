//! Infrastructure layer
//!
//! Concrete collaborators (REST API, unread-count cache) and conversions
//! between wire payloads and domain entities.

pub mod conversion;
pub mod http;
pub mod unread;

pub use http::HttpChatApi;
pub use unread::InMemoryUnreadCounts;
