//! In-process unread-count cache state.

use std::{
    collections::BTreeSet,
    sync::{Mutex, PoisonError},
};

use crate::domain::{RoomId, UnreadCounter};

/// Remembers which rooms' unread counts must be re-queried.
#[derive(Debug, Default)]
pub struct InMemoryUnreadCounts {
    stale: Mutex<BTreeSet<RoomId>>,
}

impl InMemoryUnreadCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, room_id: RoomId) -> bool {
        self.stale
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&room_id)
    }

    /// Rooms to refresh, ascending. Clears the set.
    pub fn take_stale(&self) -> Vec<RoomId> {
        let mut stale = self.stale.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *stale).into_iter().collect()
    }
}

impl UnreadCounter for InMemoryUnreadCounts {
    fn invalidate(&self, room_id: RoomId) {
        self.stale
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room_id);
    }
}
