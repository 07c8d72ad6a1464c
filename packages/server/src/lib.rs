//! Development broker for Chatline.
//!
//! Speaks the room frame protocol over `GET /ws` and serves the history,
//! last-read and unread HTTP API from an in-memory store. It exists so the
//! client can be run and tested end to end.
//!
//! Layers, from the inside out:
//!
//! - `domain`: room logs, value objects and the repository / publisher traits
//! - `usecase`: send, history and read-state use cases
//! - `infrastructure`: in-memory repository and the subscription broker
//! - `ui`: axum handlers, the frame session and the server runner

pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub use ui::{Server, ServerConfig, ServerHandle};
