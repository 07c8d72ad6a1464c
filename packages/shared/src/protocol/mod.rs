//! Text subscribe/publish protocol spoken over the chat transport.
//!
//! ## Frame layout
//!
//! ```text
//! COMMAND\n
//! key:value\n
//! ...\n
//! \n
//! body\0
//! ```
//!
//! A bare end-of-line between frames is a heartbeat.

pub mod destination;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod payload;

pub use destination::{parse_room_send, parse_room_topic, room_send, room_topic};
pub use error::CodecError;
pub use frame::{Command, Frame, decode_frames, header};
pub use heartbeat::{HeartBeat, NegotiatedHeartBeat};
pub use payload::{
    ChatMessagePayload, LastReadPayload, MessagePagePayload, SendMessagePayload,
    UnreadCountPayload,
};

/// Protocol versions offered in CONNECT and accepted in CONNECTED.
pub const PROTOCOL_VERSION: &str = "1.2";

/// Text sent on the wire as a heartbeat.
pub const HEARTBEAT: &str = "\n";
