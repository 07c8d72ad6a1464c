//! Read tracking
//!
//! Visibility reports are coalesced with a trailing debounce and sent to the
//! last-read collaborator. The marker only moves forward; failures keep the
//! candidate for the next attempt and are logged, never returned.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinHandle};

use crate::domain::{LastReadClient, MessageId, ReadMarker, RoomId, UnreadCounter};

#[derive(Debug)]
struct RoomReadState {
    marker: ReadMarker,
    /// Highest id reported visible but not yet confirmed by the server
    candidate: Option<MessageId>,
    in_flight: bool,
    scheduled: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl RoomReadState {
    fn new(room_id: RoomId) -> Self {
        Self {
            marker: ReadMarker::new(room_id),
            candidate: None,
            in_flight: false,
            scheduled: false,
            generation: 0,
            timer: None,
        }
    }

    fn drop_covered_candidate(&mut self) {
        if self
            .candidate
            .is_some_and(|candidate| self.marker.covers(candidate))
        {
            self.candidate = None;
        }
    }
}

struct Inner {
    client: Arc<dyn LastReadClient>,
    unread: Arc<dyn UnreadCounter>,
    debounce: Duration,
    rooms: Mutex<HashMap<RoomId, RoomReadState>>,
}

#[derive(Clone)]
pub struct ReadTracker {
    inner: Arc<Inner>,
}

impl ReadTracker {
    pub fn new(
        client: Arc<dyn LastReadClient>,
        unread: Arc<dyn UnreadCounter>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                unread,
                debounce,
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Report that `message_id` has been shown to the user.
    pub async fn mark_visible(&self, room_id: RoomId, message_id: MessageId) {
        let mut rooms = self.inner.rooms.lock().await;
        let state = rooms
            .entry(room_id)
            .or_insert_with(|| RoomReadState::new(room_id));

        if state.marker.covers(message_id) {
            return;
        }
        match state.candidate {
            // Not newer, but a failed update is waiting for a retry.
            Some(candidate) if message_id <= candidate => {
                if state.scheduled || state.in_flight {
                    return;
                }
            }
            _ => state.candidate = Some(message_id),
        }
        self.inner.schedule(room_id, state);
    }

    /// Seed the marker with the server's value and retry a failed update.
    pub async fn enter_room(&self, room_id: RoomId, server_last_read: Option<MessageId>) {
        let mut rooms = self.inner.rooms.lock().await;
        let state = rooms
            .entry(room_id)
            .or_insert_with(|| RoomReadState::new(room_id));

        if let Some(last_read) = server_last_read {
            state.marker.advance(last_read);
        }
        state.drop_covered_candidate();
        if state.candidate.is_some() && !state.scheduled && !state.in_flight {
            tracing::debug!("Retrying last-read update for room {}", room_id);
            self.inner.schedule(room_id, state);
        }
    }

    /// Send any pending update now instead of waiting for the debounce.
    pub async fn leave_room(&self, room_id: RoomId) {
        self.inner.flush(room_id, None).await;
    }

    /// Last id the server acknowledged as read.
    pub async fn marker(&self, room_id: RoomId) -> Option<MessageId> {
        self.inner
            .rooms
            .lock()
            .await
            .get(&room_id)
            .and_then(|state| state.marker.last_read())
    }
}

impl Inner {
    fn schedule(self: &Arc<Self>, room_id: RoomId, state: &mut RoomReadState) {
        state.generation += 1;
        state.scheduled = true;

        let generation = state.generation;
        let delay = self.debounce;
        let inner: Weak<Inner> = Arc::downgrade(self);
        // A superseded timer wakes up, sees a newer generation and exits.
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.flush(room_id, Some(generation)).await;
            }
        }));
    }

    /// Send the candidate. With `generation`, only if that timer is still
    /// the current one.
    async fn flush(self: &Arc<Self>, room_id: RoomId, generation: Option<u64>) {
        let target = {
            let mut rooms = self.rooms.lock().await;
            let Some(state) = rooms.get_mut(&room_id) else {
                return;
            };
            if generation.is_some_and(|generation| generation != state.generation) {
                return;
            }
            state.scheduled = false;
            state.drop_covered_candidate();
            if state.in_flight {
                return;
            }
            let Some(target) = state.candidate else {
                return;
            };
            state.in_flight = true;
            target
        };

        let result = self.client.set_last_read(room_id, target).await;

        let succeeded = {
            let mut rooms = self.rooms.lock().await;
            let Some(state) = rooms.get_mut(&room_id) else {
                return;
            };
            state.in_flight = false;
            match result {
                Ok(()) => {
                    state.marker.advance(target);
                    state.drop_covered_candidate();
                    tracing::debug!("Room {} read up to {}", room_id, target);
                    // A newer id arrived while the request was out.
                    if state.candidate.is_some() && !state.scheduled {
                        self.schedule(room_id, state);
                    }
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to update last-read of room {} to {}: {}",
                        room_id,
                        target,
                        e
                    );
                    false
                }
            }
        };

        if succeeded {
            self.unread.invalidate(room_id);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for state in self.rooms.get_mut().values_mut() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}
