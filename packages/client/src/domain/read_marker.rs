//! Per-room read position.

use super::value_object::{MessageId, RoomId};

/// Last message the viewer has read in a room. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMarker {
    pub room_id: RoomId,
    last_read: Option<MessageId>,
}

impl ReadMarker {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            last_read: None,
        }
    }

    pub fn last_read(&self) -> Option<MessageId> {
        self.last_read
    }

    /// Move the marker to `message_id` if that is ahead of it.
    ///
    /// Returns `true` if the marker moved.
    pub fn advance(&mut self, message_id: MessageId) -> bool {
        if self.covers(message_id) {
            return false;
        }
        self.last_read = Some(message_id);
        true
    }

    /// `true` if `message_id` is at or behind the marker.
    pub fn covers(&self, message_id: MessageId) -> bool {
        self.last_read.is_some_and(|last| message_id <= last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_never_regresses() {
        // テスト項目: 既読位置は前進のみで後退しない
        // given (前提条件):
        let mut marker = ReadMarker::new(RoomId::new(1));

        // when (操作):
        let first = marker.advance(MessageId::new(10));
        let backwards = marker.advance(MessageId::new(7));
        let same = marker.advance(MessageId::new(10));
        let forward = marker.advance(MessageId::new(11));

        // then (期待する結果):
        assert!(first);
        assert!(!backwards);
        assert!(!same);
        assert!(forward);
        assert_eq!(marker.last_read(), Some(MessageId::new(11)));
    }
}
