//! In-process transport.
//!
//! Every `open()` creates a connected pair: the client half is returned to the
//! caller and the server half ([`MemoryPeer`]) is handed to whoever holds the
//! acceptor receiver. Opens can be scripted to fail or to never complete.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatline_shared::protocol::{Command, Frame, HeartBeat, decode_frames};

use super::{TransportConnection, TransportError, TransportEvent, TransportFactory};

#[derive(Default)]
struct State {
    fail_next: usize,
    hang: bool,
    opened: usize,
    links: Vec<mpsc::UnboundedSender<TransportEvent>>,
}

struct Shared {
    state: Mutex<State>,
    acceptor: mpsc::UnboundedSender<MemoryPeer>,
}

/// Factory of in-process transport pairs
#[derive(Clone)]
pub struct MemoryTransportFactory {
    shared: Arc<Shared>,
}

enum OpenPlan {
    Refuse,
    Hang,
    Connect,
}

impl MemoryTransportFactory {
    /// Create a factory and the receiver on which server halves arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (acceptor, accepted) = mpsc::unbounded_channel();
        let factory = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                acceptor,
            }),
        };
        (factory, accepted)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Refuse the next `count` opens.
    pub fn fail_next(&self, count: usize) {
        self.with_state(|state| state.fail_next = count);
    }

    /// While set, opens never complete.
    pub fn set_hang(&self, hang: bool) {
        self.with_state(|state| state.hang = hang);
    }

    /// Number of transports successfully opened so far
    pub fn opened_count(&self) -> usize {
        self.with_state(|state| state.opened)
    }

    /// Number of opened transports whose client half is still alive
    pub fn live_count(&self) -> usize {
        self.with_state(|state| state.links.iter().filter(|link| !link.is_closed()).count())
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn open(&self) -> Result<TransportConnection, TransportError> {
        let plan = self.with_state(|state| {
            if state.fail_next > 0 {
                state.fail_next -= 1;
                OpenPlan::Refuse
            } else if state.hang {
                OpenPlan::Hang
            } else {
                OpenPlan::Connect
            }
        });

        match plan {
            OpenPlan::Refuse => {
                return Err(TransportError::Open {
                    endpoint: self.describe(),
                    reason: "connection refused".to_string(),
                });
            }
            OpenPlan::Hang => std::future::pending::<()>().await,
            OpenPlan::Connect => {}
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        self.with_state(|state| {
            state.opened += 1;
            state.links.push(to_client.clone());
        });

        let peer = MemoryPeer {
            from_client,
            to_client,
            buffered: VecDeque::new(),
        };
        if self.shared.acceptor.send(peer).is_err() {
            tracing::debug!("Memory transport opened without an acceptor");
        }

        Ok(TransportConnection { outbound, inbound })
    }
}

/// Server half of an in-process transport
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    buffered: VecDeque<Frame>,
}

impl MemoryPeer {
    /// Next raw text written by the client, heartbeats included
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame written by the client, skipping heartbeats.
    ///
    /// Returns `None` once the client closed its half.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.buffered.pop_front() {
                return Some(frame);
            }
            let text = self.from_client.recv().await?;
            self.buffer(&text);
        }
    }

    /// Frame already written by the client, if any, without waiting
    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        while self.buffered.is_empty() {
            let text = self.from_client.try_recv().ok()?;
            self.buffer(&text);
        }
        self.buffered.pop_front()
    }

    fn buffer(&mut self, text: &str) {
        match decode_frames(text) {
            Ok(frames) => self.buffered.extend(frames),
            Err(e) => tracing::warn!("Memory peer received an undecodable frame: {}", e),
        }
    }

    /// Wait for CONNECT and answer CONNECTED with heartbeats disabled.
    pub async fn accept(&mut self) -> Option<Frame> {
        self.accept_with(HeartBeat::DISABLED).await
    }

    /// Wait for CONNECT and answer CONNECTED offering `heart_beat`.
    pub async fn accept_with(&mut self, heart_beat: HeartBeat) -> Option<Frame> {
        let connect = self.recv_frame().await?;
        if connect.command != Command::Connect {
            tracing::warn!("Memory peer expected CONNECT, got {}", connect.command);
            return None;
        }
        self.send_frame(&Frame::connected(heart_beat));
        Some(connect)
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send_text(&frame.encode())
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.to_client
            .send(TransportEvent::Frame(text.to_string()))
            .is_ok()
    }

    /// Close the socket from the server side.
    pub fn close(&self) {
        let _ = self.to_client.send(TransportEvent::Closed(None));
    }

    /// Fail the socket from the server side.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Error(reason.to_string()));
    }

    /// `true` once the client dropped its half
    pub fn is_client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_connected_pair() {
        // テスト項目: open すると双方向に通信できるペアが作られる
        // given (前提条件):
        let (factory, mut accepted) = MemoryTransportFactory::new();

        // when (操作):
        let mut connection = factory.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();
        connection
            .outbound
            .send(Frame::unsubscribe("sub-0").encode())
            .unwrap();
        peer.send_text("\n");

        // then (期待する結果):
        let frame = peer.recv_frame().await.unwrap();
        assert_eq!(frame.command, Command::Unsubscribe);
        assert_eq!(
            connection.inbound.recv().await,
            Some(TransportEvent::Frame("\n".to_string()))
        );
        assert_eq!(factory.live_count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_client_half_is_observed() {
        // テスト項目: クライアント側を破棄すると live_count が減る
        // given (前提条件):
        let (factory, mut accepted) = MemoryTransportFactory::new();
        let connection = factory.open().await.unwrap();
        let peer = accepted.recv().await.unwrap();

        // when (操作):
        drop(connection);

        // then (期待する結果):
        assert!(peer.is_client_closed());
        assert_eq!(factory.live_count(), 0);
        assert_eq!(factory.opened_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_refuses_opens() {
        // テスト項目: fail_next で指定した回数だけ open が失敗する
        // given (前提条件):
        let (factory, _accepted) = MemoryTransportFactory::new();
        factory.fail_next(2);

        // when (操作):
        let first = factory.open().await;
        let second = factory.open().await;
        let third = factory.open().await;

        // then (期待する結果):
        assert!(matches!(first, Err(TransportError::Open { .. })));
        assert!(second.is_err());
        assert!(third.is_ok());
    }
}
