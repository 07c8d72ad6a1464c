//! Transport adapters
//!
//! A transport is a message-oriented duplex text channel. Opening one yields a
//! [`TransportConnection`]: an outbound sender and an inbound event receiver.
//! Dropping the outbound sender closes the underlying socket.
//!
//! ## Implementations
//!
//! - `websocket`: tokio-tungstenite client
//! - `memory`: in-process pair, used to drive the connection manager in tests
//! - [`FallbackTransportFactory`]: tries several factories in order

pub mod memory;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryPeer, MemoryTransportFactory};
pub use websocket::WebSocketTransportFactory;

use crate::config::ChannelConfig;

/// Transport-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The endpoint could not be opened
    #[error("failed to open {endpoint}: {reason}")]
    Open { endpoint: String, reason: String },

    /// Every candidate of a fallback chain failed
    #[error("no transport could be opened ({0})")]
    Exhausted(String),
}

/// Event delivered by an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text message as received from the socket
    Frame(String),
    /// Orderly close, with the peer's reason if any
    Closed(Option<String>),
    /// Socket failure
    Error(String),
}

/// Both halves of an open transport
#[derive(Debug)]
pub struct TransportConnection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports. Injected into the connection manager.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Human-readable endpoint description for logs
    fn describe(&self) -> String;

    async fn open(&self) -> Result<TransportConnection, TransportError>;
}

/// Tries each candidate in order and returns the first transport that opens.
///
/// Typically a native streaming endpoint followed by degraded ones.
pub struct FallbackTransportFactory {
    candidates: Vec<Arc<dyn TransportFactory>>,
}

impl FallbackTransportFactory {
    pub fn new(candidates: Vec<Arc<dyn TransportFactory>>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl TransportFactory for FallbackTransportFactory {
    fn describe(&self) -> String {
        self.candidates
            .iter()
            .map(|candidate| candidate.describe())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    async fn open(&self) -> Result<TransportConnection, TransportError> {
        let mut failures = Vec::with_capacity(self.candidates.len());

        for (index, candidate) in self.candidates.iter().enumerate() {
            match candidate.open().await {
                Ok(connection) => {
                    if index > 0 {
                        tracing::warn!(
                            "Primary transport unavailable, degraded to {}",
                            candidate.describe()
                        );
                    }
                    return Ok(connection);
                }
                Err(e) => {
                    tracing::debug!("Transport candidate {} failed: {}", candidate.describe(), e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(TransportError::Exhausted(failures.join("; ")))
    }
}

/// WebSocket factory for `config.url`, chained with `config.fallback_urls`
/// when any are configured.
pub fn from_config(config: &ChannelConfig) -> Arc<dyn TransportFactory> {
    let primary: Arc<dyn TransportFactory> = Arc::new(WebSocketTransportFactory::new(&config.url));
    if config.fallback_urls.is_empty() {
        return primary;
    }
    let candidates = std::iter::once(primary)
        .chain(config.fallback_urls.iter().map(|url| {
            Arc::new(WebSocketTransportFactory::new(url)) as Arc<dyn TransportFactory>
        }))
        .collect();
    Arc::new(FallbackTransportFactory::new(candidates))
}
