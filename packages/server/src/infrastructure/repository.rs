//! InMemory Room Repository 実装
//!
//! ルーム ID ごとの [`RoomLog`] を HashMap に保持します。ルームは最初の
//! 書き込みで作成されます。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ChatMessage, MessageBody, MessagePage, RepositoryError, RoomLog, RoomRepository, UserId,
};

/// インメモリ Room Repository 実装
#[derive(Default)]
pub struct InMemoryRoomRepository {
    rooms: Mutex<HashMap<u64, RoomLog>>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn append_message(
        &self,
        room_id: u64,
        sender_id: UserId,
        body: MessageBody,
        sent_at: i64,
    ) -> ChatMessage {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id)
            .or_insert_with(|| RoomLog::new(room_id))
            .append(sender_id, body, sent_at)
    }

    async fn fetch_page(&self, room_id: u64, before_id: Option<u64>, size: usize) -> MessagePage {
        let rooms = self.rooms.lock().await;
        rooms
            .get(&room_id)
            .map(|log| log.page(before_id, size))
            .unwrap_or_default()
    }

    async fn set_last_read(
        &self,
        room_id: u64,
        user_id: UserId,
        message_id: u64,
    ) -> Result<u64, RepositoryError> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id)
            .or_insert_with(|| RoomLog::new(room_id))
            .mark_read(user_id, message_id)
    }

    async fn unread_count(&self, room_id: u64, user_id: &UserId) -> u64 {
        let rooms = self.rooms.lock().await;
        rooms
            .get(&room_id)
            .map_or(0, |log| log.unread_count(user_id))
    }
}
