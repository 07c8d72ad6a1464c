//! Connection manager actor.
//!
//! [`ConnectionManager`] is a cheap handle; the state lives in a single task
//! spawned by [`ConnectionManager::spawn`]. The task multiplexes:
//!
//! - requests from handles (connect, subscribe, send...)
//! - completion of the in-flight transport open
//! - inbound transport events
//! - the connect, retry and heartbeat deadlines
//!
//! Each deadline is an `Option<Instant>`; an unset deadline never fires, so
//! clearing a timer is just assigning `None`.

use std::{collections::VecDeque, future, sync::Arc};

use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, Instant},
};

use chatline_shared::protocol::{
    ChatMessagePayload, Command, Frame, HEARTBEAT, HeartBeat, NegotiatedHeartBeat,
    decode_frames, header, room_send, room_topic,
};

use crate::{
    config::ChannelConfig,
    domain::{IncomingMessage, RoomId},
    error::ChannelError,
    transport::{TransportConnection, TransportError, TransportEvent, TransportFactory},
};

use super::{
    backoff::Backoff,
    event::ChannelEvent,
    state::ConnectionState,
    subscription::{SubscriptionPhase, SubscriptionTable},
};

const EVENT_CAPACITY: usize = 256;

/// Point-in-time view of the manager, mainly for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: ConnectionState,
    /// Outstanding `connect()` calls
    pub ref_count: usize,
    /// `(room, consumers)` ascending by room
    pub rooms: Vec<(RoomId, usize)>,
    /// SEND frames waiting for a connection
    pub queued_frames: usize,
}

enum Request {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Subscribe(RoomId, oneshot::Sender<()>),
    Unsubscribe(RoomId, oneshot::Sender<()>),
    Send {
        room_id: RoomId,
        body: String,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Phase(RoomId, oneshot::Sender<Option<SubscriptionPhase>>),
    Snapshot(oneshot::Sender<ManagerSnapshot>),
}

/// Handle to the connection actor.
///
/// Cloning is cheap; every clone talks to the same connection. The actor
/// stops, closing its transport, once the last handle is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    requests: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ChannelEvent>,
}

impl ConnectionManager {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(config: ChannelConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self::start(config, factory, None)
    }

    /// Like [`spawn`](Self::spawn), additionally forwarding every decoded chat
    /// message to `sink`. Unlike the broadcast stream, the sink never lags.
    pub fn spawn_with_message_sink(
        config: ChannelConfig,
        factory: Arc<dyn TransportFactory>,
        sink: mpsc::UnboundedSender<IncomingMessage>,
    ) -> Self {
        Self::start(config, factory, Some(sink))
    }

    fn start(
        config: ChannelConfig,
        factory: Arc<dyn TransportFactory>,
        message_sink: Option<mpsc::UnboundedSender<IncomingMessage>>,
    ) -> Self {
        let (requests, inbox) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = Actor::new(config, factory, status_tx, events.clone(), message_sink);
        tokio::spawn(actor.run(inbox));

        Self {
            requests,
            status,
            events,
        }
    }

    /// Take a reference on the connection, opening it if needed.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        self.request(Request::Connect).await
    }

    /// Release a reference; the connection closes when none remain.
    pub async fn disconnect(&self) -> Result<(), ChannelError> {
        self.request(Request::Disconnect).await
    }

    pub async fn subscribe(&self, room_id: RoomId) -> Result<(), ChannelError> {
        self.request(|reply| Request::Subscribe(room_id, reply))
            .await
    }

    pub async fn unsubscribe(&self, room_id: RoomId) -> Result<(), ChannelError> {
        self.request(|reply| Request::Unsubscribe(room_id, reply))
            .await
    }

    /// Publish a JSON body to the room, queueing it while disconnected.
    pub async fn send(&self, room_id: RoomId, body: String) -> Result<(), ChannelError> {
        self.request(|reply| Request::Send {
            room_id,
            body,
            reply,
        })
        .await?
    }

    pub async fn subscription_phase(
        &self,
        room_id: RoomId,
    ) -> Result<Option<SubscriptionPhase>, ChannelError> {
        self.request(|reply| Request::Phase(room_id, reply)).await
    }

    pub async fn snapshot(&self) -> Result<ManagerSnapshot, ChannelError> {
        self.request(Request::Snapshot).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Lets sibling components publish on the same event stream.
    pub(crate) fn event_sender(&self) -> broadcast::Sender<ChannelEvent> {
        self.events.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .map_err(|_| ChannelError::Closed)?;
        response.await.map_err(|_| ChannelError::Closed)
    }
}

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    /// CONNECTED received
    session_open: bool,
}

#[derive(Default)]
struct Timers {
    connect_deadline: Option<Instant>,
    retry_at: Option<Instant>,
    next_heartbeat: Option<Instant>,
    heartbeat_deadline: Option<Instant>,
    negotiated: NegotiatedHeartBeat,
}

type OpenTask = JoinHandle<Result<TransportConnection, TransportError>>;

struct Actor {
    config: ChannelConfig,
    factory: Arc<dyn TransportFactory>,
    client_heart_beat: HeartBeat,
    state: ConnectionState,
    ref_count: usize,
    subscriptions: SubscriptionTable,
    outbox: VecDeque<Frame>,
    link: Option<Link>,
    opening: Option<OpenTask>,
    backoff: Backoff,
    consecutive_failures: u32,
    timers: Timers,
    status_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ChannelEvent>,
    message_sink: Option<mpsc::UnboundedSender<IncomingMessage>>,
    receipt_seq: u64,
}

impl Actor {
    fn new(
        config: ChannelConfig,
        factory: Arc<dyn TransportFactory>,
        status_tx: watch::Sender<ConnectionState>,
        events_tx: broadcast::Sender<ChannelEvent>,
        message_sink: Option<mpsc::UnboundedSender<IncomingMessage>>,
    ) -> Self {
        Self {
            client_heart_beat: config.heart_beat(),
            backoff: Backoff::new(config.backoff_base, config.backoff_cap),
            config,
            factory,
            state: ConnectionState::Idle,
            ref_count: 0,
            subscriptions: SubscriptionTable::new(),
            outbox: VecDeque::new(),
            link: None,
            opening: None,
            consecutive_failures: 0,
            timers: Timers::default(),
            status_tx,
            events_tx,
            message_sink,
            receipt_seq: 0,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Request>) {
        loop {
            tokio::select! {
                request = inbox.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                opened = join_opening(&mut self.opening) => {
                    self.opening = None;
                    self.on_opened(opened);
                }
                event = recv_link(&mut self.link) => self.on_transport_event(event),
                _ = sleep_until(self.timers.connect_deadline) => {
                    self.timers.connect_deadline = None;
                    let timeout = self.config.connect_timeout;
                    self.fail(format!("connect timed out after {:?}", timeout));
                }
                _ = sleep_until(self.timers.retry_at) => {
                    self.timers.retry_at = None;
                    tracing::info!("Reconnect attempt {}", self.backoff.attempt());
                    self.begin_connect();
                }
                _ = sleep_until(self.timers.next_heartbeat) => {
                    self.write_text(HEARTBEAT.to_string());
                }
                _ = sleep_until(self.timers.heartbeat_deadline) => {
                    self.timers.heartbeat_deadline = None;
                    self.fail("no heartbeat from server".to_string());
                }
            }
        }

        tracing::debug!("All connection handles dropped, stopping connection manager");
        if self.link.is_some() || self.opening.is_some() {
            self.teardown();
        }
    }

    // ========================================
    // Requests
    // ========================================

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect(reply) => {
                self.ref_count += 1;
                if self.state.is_dormant() {
                    self.set_state(ConnectionState::Connecting);
                    self.begin_connect();
                }
                let _ = reply.send(());
            }
            Request::Disconnect(reply) => {
                if self.ref_count == 0 {
                    tracing::warn!("disconnect() called with no outstanding connect(), ignoring");
                } else {
                    self.ref_count -= 1;
                    if self.ref_count == 0 {
                        self.teardown();
                    }
                }
                let _ = reply.send(());
            }
            Request::Subscribe(room_id, reply) => {
                if self.subscriptions.acquire(room_id) && self.session_open() {
                    self.write_subscribe(room_id);
                }
                let _ = reply.send(());
            }
            Request::Unsubscribe(room_id, reply) => {
                self.unsubscribe(room_id);
                let _ = reply.send(());
            }
            Request::Send {
                room_id,
                body,
                reply,
            } => {
                let frame = Frame::send(&room_send(room_id.value()), body);
                let _ = reply.send(self.send(frame));
            }
            Request::Phase(room_id, reply) => {
                let _ = reply.send(self.subscriptions.phase(room_id).cloned());
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(ManagerSnapshot {
                    state: self.state,
                    ref_count: self.ref_count,
                    rooms: self.subscriptions.counts(),
                    queued_frames: self.outbox.len(),
                });
            }
        }
    }

    fn unsubscribe(&mut self, room_id: RoomId) {
        if self.subscriptions.ref_count(room_id) == 0 {
            tracing::warn!("unsubscribe({}) without a matching subscribe, ignoring", room_id);
            return;
        }
        let Some(released) = self.subscriptions.release(room_id) else {
            return;
        };
        tracing::debug!("Last consumer of room {} left", room_id);
        if released.needs_unsubscribe && self.session_open() {
            self.write_frame(&Frame::unsubscribe(&released.token));
        }
    }

    fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        if self.session_open() && self.write_frame(&frame) {
            return Ok(());
        }
        if self.outbox.len() >= self.config.outbox_capacity {
            tracing::warn!(
                "Outbox full ({} frames), rejecting message",
                self.outbox.len()
            );
            return Err(ChannelError::OutboxFull(self.outbox.len()));
        }
        self.outbox.push_back(frame);
        Ok(())
    }

    // ========================================
    // Lifecycle
    // ========================================

    fn begin_connect(&mut self) {
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        tracing::info!("Opening transport to {}", self.factory.describe());
        let factory = Arc::clone(&self.factory);
        self.opening = Some(tokio::spawn(async move { factory.open().await }));
        self.timers.connect_deadline = Some(Instant::now() + self.config.connect_timeout);
    }

    fn on_opened(&mut self, opened: Result<TransportConnection, TransportError>) {
        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        self.link = Some(Link {
            outbound: connection.outbound,
            inbound: connection.inbound,
            session_open: false,
        });

        let mut connect = Frame::connect(&self.config.host, self.client_heart_beat);
        if !self.config.user_id.is_empty() {
            connect = connect.header(header::USER_ID, self.config.user_id.as_str());
        }
        tracing::debug!("Transport open, sending CONNECT");
        self.write_frame(&connect);
    }

    /// Protocol session established.
    fn on_connected(&mut self, frame: &Frame) {
        let server_heart_beat = match frame.get(header::HEART_BEAT).map(HeartBeat::parse) {
            None => HeartBeat::DISABLED,
            Some(Ok(heart_beat)) => heart_beat,
            Some(Err(e)) => {
                self.fail(format!("protocol error: {}", e));
                return;
            }
        };
        if let Some(link) = self.link.as_mut() {
            link.session_open = true;
        }

        let negotiated = self.client_heart_beat.negotiate(server_heart_beat);
        let now = Instant::now();
        self.timers.connect_deadline = None;
        self.timers.negotiated = negotiated;
        self.timers.next_heartbeat = negotiated.send_every.map(|every| now + every);
        self.timers.heartbeat_deadline = self.heartbeat_window().map(|window| now + window);
        self.backoff.reset();
        self.consecutive_failures = 0;

        tracing::info!(
            "Connected (heartbeat send {:?}, expect {:?})",
            negotiated.send_every,
            negotiated.expect_every
        );
        self.set_state(ConnectionState::Connected);

        for room_id in self.subscriptions.wanted() {
            if !self.write_subscribe(room_id) {
                return;
            }
        }
        while let Some(frame) = self.outbox.pop_front() {
            if !self.write_frame(&frame) {
                self.outbox.push_front(frame);
                return;
            }
        }
    }

    /// Close everything. Reached when the reference count drops to zero.
    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            if link.session_open {
                self.receipt_seq += 1;
                let receipt = format!("disconnect-{}", self.receipt_seq);
                let _ = link.outbound.send(Frame::disconnect(&receipt).encode());
            }
        }
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        self.timers = Timers::default();
        if !self.outbox.is_empty() {
            tracing::warn!(
                "Dropping {} queued frame(s) on disconnect",
                self.outbox.len()
            );
            self.outbox.clear();
        }
        self.subscriptions.mark_all_stale();
        self.backoff.reset();
        self.consecutive_failures = 0;
        self.set_state(ConnectionState::Closed);
    }

    /// The transport is unusable; schedule a reconnect.
    fn fail(&mut self, reason: String) {
        self.link = None;
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        self.timers = Timers::default();
        self.subscriptions.mark_all_stale();

        if self.ref_count == 0 {
            tracing::info!("Connection lost with no holders: {}", reason);
            self.set_state(ConnectionState::Closed);
            return;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.backoff.next_delay();
        self.timers.retry_at = Some(Instant::now() + delay);
        tracing::warn!(
            "Connection failed ({}), reconnect attempt {} in {:?}",
            reason,
            self.backoff.attempt(),
            delay
        );
        self.set_state(ConnectionState::Reconnecting);

        if self.consecutive_failures == self.config.stall_threshold {
            tracing::warn!(
                "Reconnect stalled after {} consecutive failures",
                self.consecutive_failures
            );
            self.emit(ChannelEvent::ReconnectStalled {
                attempts: self.consecutive_failures,
            });
        }
    }

    // ========================================
    // Inbound
    // ========================================

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(text)) => self.on_text(&text),
            Some(TransportEvent::Closed(reason)) => self.fail(format!(
                "transport closed{}",
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            )),
            Some(TransportEvent::Error(reason)) => {
                self.fail(format!("transport error: {}", reason))
            }
            None => self.fail("transport closed".to_string()),
        }
    }

    fn on_text(&mut self, text: &str) {
        if let Some(window) = self.heartbeat_window() {
            self.timers.heartbeat_deadline = Some(Instant::now() + window);
        }

        let frames = match decode_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!("Undecodable frame from server: {}", e);
                self.fail(format!("protocol error: {}", e));
                return;
            }
        };

        for frame in frames {
            if self.link.is_none() {
                break;
            }
            tracing::debug!("<- {}", frame.command);
            self.on_frame(frame);
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        let session_open = self.session_open();
        match frame.command {
            Command::Connected if !session_open => self.on_connected(&frame),
            Command::Message if session_open => self.on_message(&frame),
            Command::Receipt => self.on_receipt(&frame),
            Command::Error => self.on_error(&frame),
            other => self.fail(format!("protocol error: unexpected {} frame", other)),
        }
    }

    fn on_message(&mut self, frame: &Frame) {
        let room_id = match frame
            .get(header::SUBSCRIPTION)
            .and_then(|token| self.subscriptions.room_for_token(token))
        {
            Some(room_id) => room_id,
            None => {
                tracing::debug!(
                    "Dropping MESSAGE for inactive subscription {:?}",
                    frame.get(header::SUBSCRIPTION)
                );
                return;
            }
        };

        let incoming = match serde_json::from_str::<ChatMessagePayload>(&frame.body)
            .map_err(|e| e.to_string())
            .and_then(|payload| IncomingMessage::try_from(payload).map_err(|e| e.to_string()))
        {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!("Dropping malformed message in room {}: {}", room_id, e);
                return;
            }
        };

        if incoming.room_id() != room_id {
            tracing::warn!(
                "Dropping message for room {} delivered on room {} subscription",
                incoming.room_id(),
                room_id
            );
            return;
        }

        if let Some(sink) = &self.message_sink {
            if sink.send(incoming.clone()).is_err() {
                tracing::debug!("Message sink closed");
            }
        }
        self.emit(ChannelEvent::Message(incoming));
    }

    fn on_receipt(&mut self, frame: &Frame) {
        let Some(receipt) = frame.get(header::RECEIPT_ID) else {
            tracing::debug!("RECEIPT without receipt-id");
            return;
        };
        match self.subscriptions.confirm(receipt) {
            Some(room_id) => {
                tracing::debug!("Subscribed to room {}", room_id);
                self.emit(ChannelEvent::Subscribed(room_id));
            }
            None => tracing::debug!("Receipt {} matches no pending subscription", receipt),
        }
    }

    fn on_error(&mut self, frame: &Frame) {
        let reason = frame.get(header::MESSAGE).unwrap_or("unknown error").to_string();
        let rejected = frame
            .get(header::RECEIPT_ID)
            .and_then(|receipt| self.subscriptions.reject(receipt, &reason));

        match rejected {
            Some(room_id) => {
                tracing::warn!("Subscription to room {} rejected: {}", room_id, reason);
                self.emit(ChannelEvent::SubscriptionError { room_id, reason });
            }
            None => self.fail(format!("server error: {}", reason)),
        }
    }

    // ========================================
    // Outbound
    // ========================================

    fn write_subscribe(&mut self, room_id: RoomId) -> bool {
        let Some(token) = self.subscriptions.mark_requested(room_id) else {
            return true;
        };
        tracing::debug!("Subscribing to room {} as {}", room_id, token);
        self.write_frame(&Frame::subscribe(
            &token,
            &room_topic(room_id.value()),
            &token,
        ))
    }

    fn write_frame(&mut self, frame: &Frame) -> bool {
        tracing::debug!("-> {}", frame.command);
        self.write_text(frame.encode())
    }

    /// Returns `false` when the transport is gone; the failure is already
    /// handled by then.
    fn write_text(&mut self, text: String) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };
        if link.outbound.send(text).is_err() {
            self.fail("transport write failed".to_string());
            return false;
        }
        if let Some(every) = self.timers.negotiated.send_every {
            self.timers.next_heartbeat = Some(Instant::now() + every);
        }
        true
    }

    // ========================================
    // Helpers
    // ========================================

    fn session_open(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.session_open)
    }

    fn heartbeat_window(&self) -> Option<std::time::Duration> {
        if !self.session_open() {
            return None;
        }
        self.timers
            .negotiated
            .expect_every
            .map(|every| every.mul_f64(self.config.heartbeat_tolerance))
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::info!("Connection state: {} -> {}", self.state, state);
        self.state = state;
        self.status_tx.send_replace(state);
        self.emit(ChannelEvent::Status(state));
    }

    fn emit(&self, event: ChannelEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        if let Some(task) = self.opening.take() {
            task.abort();
        }
    }
}

async fn join_opening(opening: &mut Option<OpenTask>) -> Result<TransportConnection, TransportError> {
    match opening {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::Open {
                endpoint: "transport task".to_string(),
                reason: e.to_string(),
            }),
        },
        None => future::pending().await,
    }
}

async fn recv_link(link: &mut Option<Link>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
