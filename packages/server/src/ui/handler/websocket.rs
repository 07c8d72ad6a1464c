//! WebSocket frame session.
//!
//! Each socket speaks the room frame protocol: CONNECT first, then
//! SUBSCRIBE / UNSUBSCRIBE / SEND until DISCONNECT or the socket goes away.
//! Outbound traffic (replies, MESSAGE fan-out, heartbeats) goes through one
//! channel drained by [`pusher_loop`].

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use chatline_shared::protocol::{
    Command, Frame, HEARTBEAT, HeartBeat, SendMessagePayload, decode_frames, header,
    parse_room_send, parse_room_topic,
};

use crate::{domain::UserId, ui::state::AppState};

/// Missed-heartbeat window on the read side, as a multiple of the promised interval
const READ_TIMEOUT_FACTOR: u32 = 2;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub user_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let query_user = match query.user_id.map(UserId::try_from).transpose() {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Rejecting WebSocket upgrade: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, query_user)))
}

/// Spawns a task that writes queued text to the WebSocket until every sender
/// of `rx` is gone, then closes the socket.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.close().await;
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query_user: Option<UserId>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut session = FrameSession::new(state, tx, query_user);
    let session_id = session.id;
    tracing::debug!("Frame session {} opened", session_id);

    let mut recv_task = tokio::spawn(async move {
        loop {
            let next = match session.read_timeout {
                Some(window) => match tokio::time::timeout(window, receiver.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            "No heartbeat from session {} within {:?}, closing",
                            session.id,
                            window
                        );
                        break;
                    }
                },
                None => receiver.next().await,
            };
            let msg = match next {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error on session {}: {}", session.id, e);
                    break;
                }
                None => break,
            };

            match msg {
                Message::Text(text) => {
                    if session.handle_text(text.as_str()).await == Flow::Close {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let mut push_task = pusher_loop(rx, sender);

    // The session (and with it every sender of the pusher channel) is dropped
    // when the receive task ends, which lets the pusher flush and close.
    tokio::select! {
        _ = &mut recv_task => {
            let _ = push_task.await;
        }
        _ = &mut push_task => recv_task.abort(),
    };

    tracing::debug!("Frame session {} closed", session_id);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Protocol state of one socket
struct FrameSession {
    id: Uuid,
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<String>,
    query_user: Option<UserId>,
    /// Set by CONNECT
    user_id: Option<UserId>,
    read_timeout: Option<Duration>,
    heartbeat: Option<JoinHandle<()>>,
}

impl FrameSession {
    fn new(
        state: Arc<AppState>,
        outbound: mpsc::UnboundedSender<String>,
        query_user: Option<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            outbound,
            query_user,
            user_id: None,
            read_timeout: None,
            heartbeat: None,
        }
    }

    fn send(&self, frame: &Frame) {
        tracing::debug!("Session {} <- {}", self.id, frame.command);
        let _ = self.outbound.send(frame.encode());
    }

    /// Reply with ERROR and end the session.
    fn fatal(&self, message: &str) -> Flow {
        tracing::warn!("Closing session {}: {}", self.id, message);
        self.send(&Frame::error(message, None));
        Flow::Close
    }

    async fn handle_text(&mut self, text: &str) -> Flow {
        // A bare EOL is a heartbeat and decodes to no frames.
        let frames = match decode_frames(text) {
            Ok(frames) => frames,
            Err(e) => return self.fatal(&format!("malformed frame: {}", e)),
        };
        for frame in frames {
            if self.handle_frame(frame).await == Flow::Close {
                return Flow::Close;
            }
        }
        Flow::Continue
    }

    async fn handle_frame(&mut self, frame: Frame) -> Flow {
        tracing::debug!("Session {} -> {}", self.id, frame.command);
        let Some(user_id) = self.user_id.clone() else {
            return match frame.command {
                Command::Connect => self.on_connect(&frame),
                other => self.fatal(&format!("expected CONNECT, got {}", other)),
            };
        };

        match frame.command {
            Command::Subscribe => self.on_subscribe(&frame),
            Command::Unsubscribe => self.on_unsubscribe(&frame),
            Command::Send => self.on_send(&frame, user_id).await,
            Command::Disconnect => {
                if let Some(receipt) = frame.get(header::RECEIPT) {
                    self.send(&Frame::receipt(receipt));
                }
                tracing::info!("'{}' disconnected (session {})", user_id, self.id);
                Flow::Close
            }
            Command::Connect => self.fatal("already connected"),
            other => self.fatal(&format!("unexpected {} frame", other)),
        }
    }

    fn on_connect(&mut self, frame: &Frame) -> Flow {
        let user_id = match frame.get(header::USER_ID) {
            Some(raw) => match UserId::new(raw.to_string()) {
                Ok(user_id) => user_id,
                Err(e) => return self.fatal(&e.to_string()),
            },
            None => match self.query_user.clone() {
                Some(user_id) => user_id,
                None => return self.fatal("missing user-id"),
            },
        };
        let offer = match frame.get(header::HEART_BEAT) {
            Some(raw) => match HeartBeat::parse(raw) {
                Ok(offer) => offer,
                Err(e) => return self.fatal(&e.to_string()),
            },
            None => HeartBeat::DISABLED,
        };

        let negotiated = self.state.heart_beat.negotiate(offer);
        self.read_timeout = negotiated.expect_every.map(|every| every * READ_TIMEOUT_FACTOR);
        self.send(&Frame::connected(self.state.heart_beat));
        if let Some(every) = negotiated.send_every {
            self.heartbeat = Some(spawn_heartbeat(self.outbound.clone(), every));
        }

        tracing::info!(
            "'{}' connected (session {}, heart-beat {:?})",
            user_id,
            self.id,
            negotiated
        );
        self.user_id = Some(user_id);
        Flow::Continue
    }

    fn on_subscribe(&mut self, frame: &Frame) -> Flow {
        let (id, destination) = match (frame.require(header::ID), frame.require(header::DESTINATION)) {
            (Ok(id), Ok(destination)) => (id, destination),
            (Err(e), _) | (_, Err(e)) => return self.fatal(&e.to_string()),
        };
        let receipt = frame.get(header::RECEIPT);

        let Some(room_id) = parse_room_topic(destination) else {
            self.send(&Frame::error(
                &format!("unknown destination {}", destination),
                receipt,
            ));
            return Flow::Continue;
        };
        if self.state.restricted_rooms.contains(&room_id) {
            tracing::info!("Session {} refused room {}", self.id, room_id);
            self.send(&Frame::error(
                &format!("room {} is restricted", room_id),
                receipt,
            ));
            return Flow::Continue;
        }

        self.state
            .broker
            .subscribe(room_id, self.id, id.to_string(), self.outbound.clone());
        if let Some(receipt) = receipt {
            self.send(&Frame::receipt(receipt));
        }
        tracing::info!("Session {} subscribed to room {} as {}", self.id, room_id, id);
        Flow::Continue
    }

    fn on_unsubscribe(&mut self, frame: &Frame) -> Flow {
        let id = match frame.require(header::ID) {
            Ok(id) => id,
            Err(e) => return self.fatal(&e.to_string()),
        };
        match self.state.broker.unsubscribe(self.id, id) {
            Some(room_id) => {
                tracing::info!("Session {} unsubscribed from room {}", self.id, room_id)
            }
            None => tracing::debug!("Session {} has no subscription {}", self.id, id),
        }
        if let Some(receipt) = frame.get(header::RECEIPT) {
            self.send(&Frame::receipt(receipt));
        }
        Flow::Continue
    }

    async fn on_send(&mut self, frame: &Frame, user_id: UserId) -> Flow {
        let destination = match frame.require(header::DESTINATION) {
            Ok(destination) => destination,
            Err(e) => return self.fatal(&e.to_string()),
        };
        let Some(room_id) = parse_room_send(destination) else {
            return self.fatal(&format!("cannot send to {}", destination));
        };
        let payload = match serde_json::from_str::<SendMessagePayload>(&frame.body) {
            Ok(payload) => payload,
            Err(e) => return self.fatal(&format!("invalid message payload: {}", e)),
        };
        if payload.room_id != room_id {
            return self.fatal(&format!(
                "payload room {} does not match destination room {}",
                payload.room_id, room_id
            ));
        }
        if payload.sender_id != user_id.as_str() {
            tracing::warn!(
                "Session {} of '{}' sent as '{}'; using the session user",
                self.id,
                user_id,
                payload.sender_id
            );
        }

        match self
            .state
            .send_message_usecase
            .execute(room_id, user_id, payload.body, payload.client_temp_id)
            .await
        {
            Ok(_) => {
                if let Some(receipt) = frame.get(header::RECEIPT) {
                    self.send(&Frame::receipt(receipt));
                }
                Flow::Continue
            }
            Err(e) => self.fatal(&format!("message rejected: {}", e)),
        }
    }
}

impl Drop for FrameSession {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        let removed = self.state.broker.remove_session(self.id);
        if removed > 0 {
            tracing::debug!("Dropped {} subscriptions of session {}", removed, self.id);
        }
    }
}

fn spawn_heartbeat(outbound: mpsc::UnboundedSender<String>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if outbound.send(HEARTBEAT.to_string()).is_err() {
                break;
            }
        }
    })
}
