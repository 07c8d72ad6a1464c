//! Real-time chat channel client.
//!
//! The crate is layered the same way the rest of the workspace is:
//!
//! - `domain`: value objects, messages, read markers and the collaborator
//!   traits the core consumes (history, last-read, unread counts)
//! - `transport`: streaming socket adapters (WebSocket, fallback chain, in-memory)
//! - `connection`: the reference-counted, reconnecting connection manager
//! - `reconciler`: merges live messages into the paginated history cache
//! - `read_tracker`: debounced, monotonic last-read updates
//! - `session`: the facade UI surfaces hold
//! - `infrastructure`: HTTP collaborators and payload conversions
//! - `cli`: the terminal client used by the `chatline-client` binary

pub mod cli;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod read_tracker;
pub mod reconciler;
pub mod session;
pub mod transport;

pub use config::ChannelConfig;
pub use connection::{ChannelEvent, ConnectionManager, ConnectionState};
pub use error::ChannelError;
pub use reconciler::MessageReconciler;
pub use read_tracker::ReadTracker;
pub use session::{ChatSession, Collaborators};
