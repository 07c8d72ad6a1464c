//! Request handlers.

pub mod http;
pub mod websocket;

pub use http::{get_messages, get_unread, health_check, put_last_read};
pub use websocket::websocket_handler;
