//! UI layer: HTTP and WebSocket entry points of the broker.

pub mod handler;
pub mod server;
pub mod signal;
pub mod state;

pub use server::{Server, ServerConfig, ServerHandle};
