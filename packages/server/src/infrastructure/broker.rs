//! Room subscription registry and MESSAGE fan-out.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use chatline_shared::protocol::{Frame, room_topic};

use crate::domain::{ChatMessage, MessagePublisher};

use super::dto::message_payload;

/// Outbound text channel of one frame session
pub type SessionChannel = mpsc::UnboundedSender<String>;

struct Subscriber {
    session_id: Uuid,
    subscription_id: String,
    outbound: SessionChannel,
}

/// Tracks which session subscription listens to which room
#[derive(Default)]
pub struct RoomBroker {
    rooms: Mutex<HashMap<u64, Vec<Subscriber>>>,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rooms<T>(&self, f: impl FnOnce(&mut HashMap<u64, Vec<Subscriber>>) -> T) -> T {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rooms)
    }

    /// Register a subscription. A repeated subscription id of the same
    /// session replaces the previous one.
    pub fn subscribe(
        &self,
        room_id: u64,
        session_id: Uuid,
        subscription_id: String,
        outbound: SessionChannel,
    ) {
        self.unsubscribe(session_id, &subscription_id);
        self.with_rooms(|rooms| {
            rooms.entry(room_id).or_default().push(Subscriber {
                session_id,
                subscription_id,
                outbound,
            });
        });
    }

    /// Remove one subscription. Returns the room it was listening to.
    pub fn unsubscribe(&self, session_id: Uuid, subscription_id: &str) -> Option<u64> {
        self.with_rooms(|rooms| {
            let mut found = None;
            for (room_id, subscribers) in rooms.iter_mut() {
                let before = subscribers.len();
                subscribers.retain(|s| {
                    !(s.session_id == session_id && s.subscription_id == subscription_id)
                });
                if subscribers.len() != before {
                    found = Some(*room_id);
                }
            }
            rooms.retain(|_, subscribers| !subscribers.is_empty());
            found
        })
    }

    /// Drop every subscription of a session. Returns how many were removed.
    pub fn remove_session(&self, session_id: Uuid) -> usize {
        self.with_rooms(|rooms| {
            let mut removed = 0;
            for subscribers in rooms.values_mut() {
                let before = subscribers.len();
                subscribers.retain(|s| s.session_id != session_id);
                removed += before - subscribers.len();
            }
            rooms.retain(|_, subscribers| !subscribers.is_empty());
            removed
        })
    }

    pub fn subscriber_count(&self, room_id: u64) -> usize {
        self.with_rooms(|rooms| rooms.get(&room_id).map_or(0, Vec::len))
    }
}

#[async_trait]
impl MessagePublisher for RoomBroker {
    async fn publish(&self, message: &ChatMessage, client_temp_id: Option<String>) -> usize {
        let json = match serde_json::to_string(&message_payload(message, client_temp_id)) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize message {}: {}", message.message_id, e);
                return 0;
            }
        };
        let destination = room_topic(message.room_id);
        let message_id = message.message_id.to_string();

        self.with_rooms(|rooms| {
            let Some(subscribers) = rooms.get_mut(&message.room_id) else {
                return 0;
            };
            // Sessions whose socket went away are pruned on the way.
            subscribers.retain(|subscriber| {
                let frame = Frame::message(
                    &destination,
                    &message_id,
                    &subscriber.subscription_id,
                    json.as_str(),
                );
                subscriber.outbound.send(frame.encode()).is_ok()
            });
            subscribers.len()
        })
    }
}
