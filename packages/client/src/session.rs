//! Chat session facade
//!
//! [`ChatSession`] wires the connection manager, reconciler and read-tracker
//! together and is what UI surfaces hold. Live messages decoded by the
//! manager are pumped into the reconciler by a background task that lives as
//! long as the session.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use chatline_shared::time::{Clock, SystemClock};

use crate::{
    config::ChannelConfig,
    connection::{ChannelEvent, ConnectionManager, ConnectionState, SubscriptionPhase},
    domain::{
        HistoryClient, LastReadClient, Message, MessageId, RoomId, SenderId, Timestamp,
        UnreadCounter,
    },
    error::ChannelError,
    infrastructure::conversion::send_payload,
    read_tracker::ReadTracker,
    reconciler::MessageReconciler,
    transport::TransportFactory,
};

/// External services a session depends on
#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn HistoryClient>,
    pub last_read: Arc<dyn LastReadClient>,
    pub unread: Arc<dyn UnreadCounter>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// One object implementing every collaborator, with the system clock.
    pub fn from_api<A>(api: Arc<A>, unread: Arc<dyn UnreadCounter>) -> Self
    where
        A: HistoryClient + LastReadClient + 'static,
    {
        Self {
            history: api.clone(),
            last_read: api,
            unread,
            clock: Arc::new(SystemClock),
        }
    }
}

struct PumpGuard(JoinHandle<()>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct ChatSession {
    manager: ConnectionManager,
    reconciler: MessageReconciler,
    read_tracker: ReadTracker,
    user_id: SenderId,
    clock: Arc<dyn Clock>,
    confirm_timeout: Duration,
    viewers: Arc<Mutex<HashMap<RoomId, usize>>>,
    _pump: Arc<PumpGuard>,
}

impl ChatSession {
    /// Build a session. Must be called inside a tokio runtime.
    pub fn new(
        config: ChannelConfig,
        factory: Arc<dyn TransportFactory>,
        collaborators: Collaborators,
    ) -> Result<Self, ChannelError> {
        let user_id = SenderId::new(config.user_id.clone())?;
        let confirm_timeout = config.subscribe_confirm_timeout;
        let page_size = config.page_size;
        let read_debounce = config.read_debounce;

        let (sink, mut incoming) = mpsc::unbounded_channel();
        let manager = ConnectionManager::spawn_with_message_sink(config, factory, sink);
        let reconciler = MessageReconciler::with_notices(
            collaborators.history,
            collaborators.unread.clone(),
            page_size,
            manager.event_sender(),
        );
        let read_tracker = ReadTracker::new(
            collaborators.last_read,
            collaborators.unread,
            read_debounce,
        );

        let pump_reconciler = reconciler.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                pump_reconciler.ingest(message).await;
            }
        });

        Ok(Self {
            manager,
            reconciler,
            read_tracker,
            user_id,
            clock: collaborators.clock,
            confirm_timeout,
            viewers: Arc::new(Mutex::new(HashMap::new())),
            _pump: Arc::new(PumpGuard(pump)),
        })
    }

    /// Take a reference on the shared connection.
    pub async fn open(&self) -> Result<(), ChannelError> {
        self.manager.connect().await
    }

    /// Release the reference taken by [`open`](Self::open).
    pub async fn close(&self) -> Result<(), ChannelError> {
        self.manager.disconnect().await
    }

    /// Subscribe to the room and load its latest page.
    ///
    /// A history failure alone still enters the room (flagged incomplete);
    /// only when the live subscription fails too is
    /// [`ChannelError::RoomEntry`] returned.
    pub async fn enter_room(&self, room_id: RoomId) -> Result<(), ChannelError> {
        let mut events = self.manager.events();
        self.manager.subscribe(room_id).await?;

        if self.add_viewer(room_id) == 1 {
            if let Err(history_error) = self.reconciler.load_latest(room_id).await {
                tracing::warn!("Failed to load history of room {}: {}", room_id, history_error);
                match self.await_subscription(room_id, &mut events).await {
                    Ok(()) => self.reconciler.mark_incomplete(room_id).await,
                    Err(live) => {
                        self.remove_viewer(room_id);
                        self.reconciler.unload(room_id).await;
                        self.manager.unsubscribe(room_id).await?;
                        return Err(ChannelError::RoomEntry {
                            room_id,
                            history: history_error.to_string(),
                            live,
                        });
                    }
                }
            }
        }

        self.read_tracker.enter_room(room_id, None).await;
        tracing::info!("Entered room {}", room_id);
        Ok(())
    }

    pub async fn leave_room(&self, room_id: RoomId) -> Result<(), ChannelError> {
        self.read_tracker.leave_room(room_id).await;
        if self.remove_viewer(room_id) == 0 {
            self.reconciler.unload(room_id).await;
        }
        self.manager.unsubscribe(room_id).await?;
        tracing::info!("Left room {}", room_id);
        Ok(())
    }

    /// Show the message optimistically and publish it.
    ///
    /// If it cannot be queued the optimistic copy is marked failed and the
    /// error returned.
    pub async fn send_message(
        &self,
        room_id: RoomId,
        body: impl Into<String>,
    ) -> Result<Message, ChannelError> {
        let sent_at = Timestamp::new(self.clock.now_millis());
        let pending = self
            .reconciler
            .add_pending(room_id, self.user_id.clone(), body.into(), sent_at)
            .await;

        let result = match serde_json::to_string(&send_payload(&pending)) {
            Ok(json) => self.manager.send(room_id, json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("Message to room {} not sent: {}", room_id, e);
            if let Some(temp_id) = pending.temp_id() {
                self.reconciler.mark_failed(room_id, temp_id).await;
            }
            return Err(e);
        }
        Ok(pending)
    }

    pub async fn load_older(&self, room_id: RoomId) -> Result<usize, ChannelError> {
        self.reconciler.load_older(room_id).await
    }

    pub async fn mark_visible(&self, room_id: RoomId, message_id: MessageId) {
        self.read_tracker.mark_visible(room_id, message_id).await;
    }

    pub async fn messages(&self, room_id: RoomId) -> Vec<Message> {
        self.reconciler.snapshot(room_id).await
    }

    pub fn status(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.manager.events()
    }

    pub fn user_id(&self) -> &SenderId {
        &self.user_id
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    pub fn read_tracker(&self) -> &ReadTracker {
        &self.read_tracker
    }

    /// Wait for the server's verdict on the room subscription.
    async fn await_subscription(
        &self,
        room_id: RoomId,
        events: &mut broadcast::Receiver<ChannelEvent>,
    ) -> Result<(), String> {
        let wait = async {
            loop {
                match self.manager.subscription_phase(room_id).await {
                    Ok(Some(SubscriptionPhase::Active)) => return Ok(()),
                    Ok(Some(SubscriptionPhase::Rejected(reason))) => return Err(reason),
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
                loop {
                    match events.recv().await {
                        Ok(ChannelEvent::Subscribed(room)) if room == room_id => return Ok(()),
                        Ok(ChannelEvent::SubscriptionError { room_id: room, reason })
                            if room == room_id =>
                        {
                            return Err(reason);
                        }
                        Ok(_) => {}
                        // Missed events: re-read the phase.
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(ChannelError::Closed.to_string());
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(self.confirm_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "subscription not confirmed within {:?}",
                self.confirm_timeout
            )),
        }
    }

    fn add_viewer(&self, room_id: RoomId) -> usize {
        let mut viewers = self.viewers.lock().unwrap_or_else(PoisonError::into_inner);
        let count = viewers.entry(room_id).or_insert(0);
        *count += 1;
        *count
    }

    fn remove_viewer(&self, room_id: RoomId) -> usize {
        let mut viewers = self.viewers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(count) = viewers.get_mut(&room_id) else {
            return 0;
        };
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            viewers.remove(&room_id);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use chatline_shared::{
        protocol::{ChatMessagePayload, Command, Frame, header},
        time::FixedClock,
    };
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        domain::{
            CollaboratorError, MockHistoryClient, MockLastReadClient, MockUnreadCounter,
            RoomMessagePage,
        },
        transport::MemoryTransportFactory,
    };

    fn config() -> ChannelConfig {
        ChannelConfig {
            user_id: "alice".to_string(),
            ..ChannelConfig::default()
        }
        .without_heartbeat()
    }

    fn collaborators(history: MockHistoryClient) -> Collaborators {
        let mut unread = MockUnreadCounter::new();
        unread.expect_invalidate().return_const(());
        Collaborators {
            history: Arc::new(history),
            last_read: Arc::new(MockLastReadClient::new()),
            unread: Arc::new(unread),
            clock: Arc::new(FixedClock::new(1_000)),
        }
    }

    fn empty_history() -> MockHistoryClient {
        let mut history = MockHistoryClient::new();
        history
            .expect_fetch_page()
            .returning(|_, _, _| Ok(RoomMessagePage::default()));
        history
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_is_confirmed_by_echo() {
        // テスト項目: 送信したメッセージがエコーで確定し、1 件だけ表示される
        // given (前提条件):
        let (factory, mut accepted) = MemoryTransportFactory::new();
        let session =
            ChatSession::new(config(), Arc::new(factory), collaborators(empty_history())).unwrap();
        session.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();
        peer.accept().await.unwrap();
        let room = RoomId::new(3);
        session.enter_room(room).await.unwrap();
        let subscribe = peer.recv_frame().await.unwrap();
        assert_eq!(subscribe.command, Command::Subscribe);
        let token = subscribe.get(header::ID).unwrap().to_string();

        // when (操作):
        let pending = session.send_message(room, "hello").await.unwrap();
        let send = peer.recv_frame().await.unwrap();
        let sent: chatline_shared::protocol::SendMessagePayload =
            serde_json::from_str(&send.body).unwrap();
        let echo = ChatMessagePayload {
            room_id: 3,
            message_id: 42,
            sender_id: sent.sender_id,
            body: sent.body,
            sent_at: 2_000,
            client_temp_id: sent.client_temp_id,
        };
        let mut events = session.events();
        peer.send_frame(&Frame::message(
            "/topic/rooms/3",
            "42",
            &token,
            serde_json::to_string(&echo).unwrap(),
        ));
        loop {
            if let ChannelEvent::Message(_) = events.recv().await.unwrap() {
                break;
            }
        }
        tokio::task::yield_now().await;
        let mut messages = session.messages(room).await;
        while messages.iter().any(Message::is_pending) {
            tokio::task::yield_now().await;
            messages = session.messages(room).await;
        }

        // then (期待する結果):
        assert!(pending.is_pending());
        assert_eq!(pending.sent_at, Timestamp::new(1_000));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id(), Some(MessageId::new(42)));
        assert_eq!(messages[0].body, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_room_fails_when_history_and_subscription_fail() {
        // テスト項目: 履歴取得と購読の両方が失敗すると RoomEntry エラーになる
        // given (前提条件):
        let mut history = MockHistoryClient::new();
        history
            .expect_fetch_page()
            .with(eq(RoomId::new(9)), eq(None::<MessageId>), eq(30usize))
            .returning(|_, _, _| Err(CollaboratorError::Status(500)));
        let (factory, mut accepted) = MemoryTransportFactory::new();
        let session =
            ChatSession::new(config(), Arc::new(factory), collaborators(history)).unwrap();
        session.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();
        peer.accept().await.unwrap();

        let server = tokio::spawn(async move {
            let subscribe = peer.recv_frame().await.unwrap();
            let receipt = subscribe.get(header::RECEIPT).unwrap().to_string();
            peer.send_frame(&Frame::error("room 9 is restricted", Some(&receipt)));
            peer
        });

        // when (操作):
        let result = session.enter_room(RoomId::new(9)).await;

        // then (期待する結果):
        match result {
            Err(ChannelError::RoomEntry {
                room_id,
                history,
                live,
            }) => {
                assert_eq!(room_id, RoomId::new(9));
                assert!(history.contains("500"));
                assert_eq!(live, "room 9 is restricted");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let _peer = server.await.unwrap();
        let snapshot = session.manager().snapshot().await.unwrap();
        assert!(snapshot.rooms.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_room_with_live_only_marks_history_incomplete() {
        // テスト項目: 履歴取得だけが失敗した場合は入室でき、履歴不完全として通知される
        // given (前提条件):
        let mut history = MockHistoryClient::new();
        history
            .expect_fetch_page()
            .returning(|_, _, _| Err(CollaboratorError::Request("timeout".to_string())));
        let (factory, mut accepted) = MemoryTransportFactory::new();
        let session =
            ChatSession::new(config(), Arc::new(factory), collaborators(history)).unwrap();
        session.open().await.unwrap();
        let mut peer = accepted.recv().await.unwrap();
        peer.accept().await.unwrap();
        let mut events = session.events();

        let server = tokio::spawn(async move {
            let subscribe = peer.recv_frame().await.unwrap();
            let receipt = subscribe.get(header::RECEIPT).unwrap().to_string();
            peer.send_frame(&Frame::receipt(&receipt));
            peer
        });

        // when (操作):
        let result = session.enter_room(RoomId::new(2)).await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
        let _peer = server.await.unwrap();
        assert!(session.reconciler().is_incomplete(RoomId::new(2)).await);
        let mut saw_notice = false;
        while let Ok(event) = events.try_recv() {
            if event == ChannelEvent::HistoryIncomplete(RoomId::new(2)) {
                saw_notice = true;
            }
        }
        assert!(saw_notice);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_requires_user_id() {
        // テスト項目: ユーザー ID が空の設定ではセッションを作成できない
        // given (前提条件):
        let (factory, _accepted) = MemoryTransportFactory::new();
        let config = ChannelConfig::default();

        // when (操作):
        let result = ChatSession::new(config, Arc::new(factory), collaborators(empty_history()));

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ChannelError::Value(crate::domain::ValueError::EmptySenderId))
        ));
    }
}
