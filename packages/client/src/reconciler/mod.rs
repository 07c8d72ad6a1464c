//! Message reconciliation
//!
//! Merges live messages from the connection with paginated history so each
//! viewed room shows one ordered, duplicate-free sequence. Rooms without a
//! viewer are not cached; live traffic for them only marks the unread count
//! stale.

pub mod history;

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, broadcast};

use crate::{
    connection::ChannelEvent,
    domain::{
        ClientTempId, HistoryClient, IncomingMessage, Message, MessageId, RoomId, SenderId,
        Timestamp, UnreadCounter,
    },
    error::ChannelError,
};

pub use history::{GapRange, IngestOutcome, PageKind, RoomHistory};

/// Result of [`MessageReconciler::ingest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// No viewer: unread count invalidated instead
    NotLoaded,
    Merged(IngestOutcome),
}

struct Inner {
    rooms: Mutex<HashMap<RoomId, RoomHistory>>,
    history: Arc<dyn HistoryClient>,
    unread: Arc<dyn UnreadCounter>,
    notices: Option<broadcast::Sender<ChannelEvent>>,
    page_size: usize,
}

#[derive(Clone)]
pub struct MessageReconciler {
    inner: Arc<Inner>,
}

impl MessageReconciler {
    pub fn new(
        history: Arc<dyn HistoryClient>,
        unread: Arc<dyn UnreadCounter>,
        page_size: usize,
    ) -> Self {
        Self::build(history, unread, page_size, None)
    }

    /// Publish `HistoryIncomplete` notices on `notices`.
    pub fn with_notices(
        history: Arc<dyn HistoryClient>,
        unread: Arc<dyn UnreadCounter>,
        page_size: usize,
        notices: broadcast::Sender<ChannelEvent>,
    ) -> Self {
        Self::build(history, unread, page_size, Some(notices))
    }

    fn build(
        history: Arc<dyn HistoryClient>,
        unread: Arc<dyn UnreadCounter>,
        page_size: usize,
        notices: Option<broadcast::Sender<ChannelEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                rooms: Mutex::new(HashMap::new()),
                history,
                unread,
                notices,
                page_size: page_size.max(1),
            }),
        }
    }

    /// Start caching `room_id` and fetch its latest page.
    ///
    /// The room is tracked before the request goes out, so live messages that
    /// arrive meanwhile are kept and merged with the page.
    pub async fn load_latest(&self, room_id: RoomId) -> Result<(), ChannelError> {
        self.inner
            .rooms
            .lock()
            .await
            .entry(room_id)
            .or_insert_with(RoomHistory::new);

        let page = self
            .inner
            .history
            .fetch_page(room_id, None, self.inner.page_size)
            .await?;
        tracing::debug!(
            "Loaded {} message(s) for room {}",
            page.items.len(),
            room_id
        );

        let holes = {
            let mut rooms = self.inner.rooms.lock().await;
            match rooms.get_mut(&room_id) {
                Some(history) => history.merge_page(page, PageKind::Initial),
                None => return Ok(()),
            }
        };
        for gap in holes {
            self.heal(room_id, gap).await;
        }
        Ok(())
    }

    /// Fetch the next older page. Returns the number of messages it held;
    /// zero when there is nothing older or the room is not cached.
    pub async fn load_older(&self, room_id: RoomId) -> Result<usize, ChannelError> {
        let cursor = {
            let rooms = self.inner.rooms.lock().await;
            match rooms.get(&room_id) {
                Some(history) if history.has_next() => history.cursor(),
                _ => return Ok(0),
            }
        };

        let page = self
            .inner
            .history
            .fetch_page(room_id, cursor, self.inner.page_size)
            .await?;
        let count = page.items.len();

        let mut rooms = self.inner.rooms.lock().await;
        if let Some(history) = rooms.get_mut(&room_id) {
            history.merge_page(page, PageKind::Older);
        }
        Ok(count)
    }

    /// Merge one live message.
    pub async fn ingest(&self, incoming: IncomingMessage) -> Reconciled {
        let room_id = incoming.room_id();
        let message_id = incoming.message_id;

        let outcome = self
            .inner
            .rooms
            .lock()
            .await
            .get_mut(&room_id)
            .map(|history| history.ingest(incoming));
        let Some(outcome) = outcome else {
            tracing::debug!(
                "Message {} for unviewed room {}, invalidating unread count",
                message_id,
                room_id
            );
            self.inner.unread.invalidate(room_id);
            return Reconciled::NotLoaded;
        };

        if let Some(gap) = outcome.gap() {
            tracing::info!(
                "Gap in room {} before message {}: re-fetching {}..={}",
                room_id,
                message_id,
                gap.from,
                gap.to
            );
            self.heal(room_id, gap).await;
        }
        Reconciled::Merged(outcome)
    }

    /// Show an optimistic message and return it; its temp id is the
    /// `clientTempId` to send.
    pub async fn add_pending(
        &self,
        room_id: RoomId,
        sender_id: SenderId,
        body: String,
        sent_at: Timestamp,
    ) -> Message {
        let message = Message::pending(
            room_id,
            ClientTempId::generate(),
            sender_id,
            body,
            sent_at,
        );
        let mut rooms = self.inner.rooms.lock().await;
        if let Some(history) = rooms.get_mut(&room_id) {
            history.add_pending(message.clone());
        }
        message
    }

    /// The message could not be handed to the connection.
    pub async fn mark_failed(&self, room_id: RoomId, temp_id: &ClientTempId) -> bool {
        let mut rooms = self.inner.rooms.lock().await;
        rooms
            .get_mut(&room_id)
            .is_some_and(|history| history.mark_failed(temp_id))
    }

    /// Flag the room as missing history and notify observers.
    pub async fn mark_incomplete(&self, room_id: RoomId) {
        if let Some(history) = self.inner.rooms.lock().await.get_mut(&room_id) {
            history.mark_incomplete();
        }
        self.notify_incomplete(room_id);
    }

    /// Stop caching the room.
    pub async fn unload(&self, room_id: RoomId) {
        self.inner.rooms.lock().await.remove(&room_id);
    }

    /// Ordered messages of the room; empty when it is not cached.
    pub async fn snapshot(&self, room_id: RoomId) -> Vec<Message> {
        self.inner
            .rooms
            .lock()
            .await
            .get(&room_id)
            .map(RoomHistory::snapshot)
            .unwrap_or_default()
    }

    pub async fn is_loaded(&self, room_id: RoomId) -> bool {
        self.inner
            .rooms
            .lock()
            .await
            .get(&room_id)
            .is_some_and(RoomHistory::is_loaded)
    }

    pub async fn is_incomplete(&self, room_id: RoomId) -> bool {
        self.inner
            .rooms
            .lock()
            .await
            .get(&room_id)
            .is_some_and(RoomHistory::is_incomplete)
    }

    pub async fn latest_id(&self, room_id: RoomId) -> Option<MessageId> {
        self.inner
            .rooms
            .lock()
            .await
            .get(&room_id)
            .and_then(RoomHistory::max_id)
    }

    /// Fetch `gap` page by page, newest first, until it is filled. A failed
    /// request or a page that makes no progress leaves the rest failed.
    async fn heal(&self, room_id: RoomId, gap: GapRange) {
        let mut missing = gap;
        loop {
            let result = self
                .inner
                .history
                .fetch_page(room_id, Some(missing.to.next()), missing.len())
                .await;

            let mut rooms = self.inner.rooms.lock().await;
            let Some(history) = rooms.get_mut(&room_id) else {
                return;
            };
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        "Failed to re-fetch messages {}..={} of room {}: {}",
                        missing.from,
                        missing.to,
                        room_id,
                        e
                    );
                    history.fail_gap(missing);
                    drop(rooms);
                    self.notify_incomplete(room_id);
                    return;
                }
            };

            match history.merge_page(page, PageKind::Gap(missing)).pop() {
                None => return,
                Some(rest) if rest == missing => {
                    tracing::warn!(
                        "Re-fetch of messages {}..={} of room {} returned none of them",
                        missing.from,
                        missing.to,
                        room_id
                    );
                    history.fail_gap(rest);
                    drop(rooms);
                    self.notify_incomplete(room_id);
                    return;
                }
                Some(rest) => {
                    tracing::debug!(
                        "Room {} still missing {}..={}, fetching again",
                        room_id,
                        rest.from,
                        rest.to
                    );
                    missing = rest;
                }
            }
        }
    }

    fn notify_incomplete(&self, room_id: RoomId) {
        if let Some(notices) = &self.inner.notices {
            let _ = notices.send(ChannelEvent::HistoryIncomplete(room_id));
        }
    }
}
