//! Code shared between the Chatline client and the development broker.
//!
//! - `protocol`: text frame codec, room destinations and JSON payloads
//! - `logger`: tracing subscriber setup for binaries
//! - `time`: clock abstraction and timestamp formatting

pub mod logger;
pub mod protocol;
pub mod time;
