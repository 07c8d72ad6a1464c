//! Value objects for the chat domain.

use std::fmt;

use thiserror::Error;

/// Maximum length of a sender id
pub const SENDER_ID_MAX_LEN: usize = 64;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("sender id must not be empty")]
    EmptySenderId,

    #[error("sender id is {actual} characters long (max {max})")]
    SenderIdTooLong { max: usize, actual: usize },

    #[error("client temp id must not be empty")]
    EmptyClientTempId,
}

/// Numeric room identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomId(u64);

impl RoomId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-assigned message id, strictly increasing within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The id the server would assign next in the same room.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Temporary id of a locally-sent message awaiting its server echo
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientTempId(String);

impl ClientTempId {
    pub fn new(value: String) -> Result<Self, ValueError> {
        if value.is_empty() {
            return Err(ValueError::EmptyClientTempId);
        }
        Ok(Self(value))
    }

    /// Fresh random id, `tmp-<uuid v4>`
    pub fn generate() -> Self {
        Self(format!("tmp-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ClientTempId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ClientTempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message author
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderId(String);

impl SenderId {
    pub fn new(value: String) -> Result<Self, ValueError> {
        if value.is_empty() {
            return Err(ValueError::EmptySenderId);
        }
        let actual = value.chars().count();
        if actual > SENDER_ID_MAX_LEN {
            return Err(ValueError::SenderIdTooLong {
                max: SENDER_ID_MAX_LEN,
                actual,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for SenderId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}
