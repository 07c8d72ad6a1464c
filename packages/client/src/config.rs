//! Chat channel configuration.
//!
//! Heartbeat and backoff constants are not fixed by the server contract, so
//! they are configuration with the defaults below. Durations are expressed in
//! milliseconds when (de)serialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chatline_shared::protocol::HeartBeat;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_TOLERANCE: f64 = 1.5;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);
pub const DEFAULT_STALL_THRESHOLD: u32 = 5;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;
pub const DEFAULT_READ_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_PAGE_SIZE: usize = 30;
pub const DEFAULT_SUBSCRIBE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Primary transport endpoint
    pub url: String,
    /// Endpoints tried in order when the primary cannot be opened
    pub fallback_urls: Vec<String>,
    /// Value of the CONNECT `host` header
    pub host: String,
    /// Identity announced in CONNECT and used as sender of outgoing messages
    pub user_id: String,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Interval we offer to send heartbeats at (zero disables)
    #[serde(with = "duration_ms")]
    pub heartbeat_outgoing: Duration,
    /// Interval we ask the server to send heartbeats at (zero disables)
    #[serde(with = "duration_ms")]
    pub heartbeat_incoming: Duration,
    /// Silence longer than `tolerance × negotiated interval` is a dead link
    pub heartbeat_tolerance: f64,
    #[serde(with = "duration_ms")]
    pub backoff_base: Duration,
    #[serde(with = "duration_ms")]
    pub backoff_cap: Duration,
    /// Consecutive failed attempts before `ReconnectStalled` is emitted
    pub stall_threshold: u32,
    /// SEND frames buffered while disconnected
    pub outbox_capacity: usize,
    #[serde(with = "duration_ms")]
    pub read_debounce: Duration,
    pub page_size: usize,
    /// How long room entry waits for the subscription outcome after a
    /// history failure
    #[serde(with = "duration_ms")]
    pub subscribe_confirm_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            fallback_urls: Vec::new(),
            host: "localhost".to_string(),
            user_id: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            heartbeat_tolerance: DEFAULT_HEARTBEAT_TOLERANCE,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            read_debounce: DEFAULT_READ_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
            subscribe_confirm_timeout: DEFAULT_SUBSCRIBE_CONFIRM_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    /// Our side of the `heart-beat` negotiation.
    pub fn heart_beat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing, self.heartbeat_incoming)
    }

    /// Disable heartbeats in both directions.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_outgoing = Duration::ZERO;
        self.heartbeat_incoming = Duration::ZERO;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
