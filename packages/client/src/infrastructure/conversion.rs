//! Conversion logic between wire payloads and domain entities.

use chatline_shared::protocol::{ChatMessagePayload, MessagePagePayload, SendMessagePayload};

use crate::domain::{
    ClientTempId, IncomingMessage, Message, MessageId, RoomId, RoomMessagePage, SenderId,
    Timestamp, ValueError,
};

// ========================================
// Payload → Domain Entity
// ========================================

impl TryFrom<ChatMessagePayload> for Message {
    type Error = ValueError;

    fn try_from(payload: ChatMessagePayload) -> Result<Self, Self::Error> {
        Ok(Message::confirmed(
            RoomId::new(payload.room_id),
            MessageId::new(payload.message_id),
            SenderId::new(payload.sender_id)?,
            payload.body,
            Timestamp::new(payload.sent_at),
        ))
    }
}

impl TryFrom<ChatMessagePayload> for IncomingMessage {
    type Error = ValueError;

    fn try_from(mut payload: ChatMessagePayload) -> Result<Self, Self::Error> {
        let client_temp_id = payload
            .client_temp_id
            .take()
            .filter(|raw| !raw.is_empty())
            .map(ClientTempId::new)
            .transpose()?;
        let message_id = MessageId::new(payload.message_id);
        let message = Message::try_from(payload)?;
        Ok(IncomingMessage {
            message,
            message_id,
            client_temp_id,
        })
    }
}

impl TryFrom<MessagePagePayload> for RoomMessagePage {
    type Error = ValueError;

    fn try_from(payload: MessagePagePayload) -> Result<Self, Self::Error> {
        let items = payload
            .items
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RoomMessagePage {
            items,
            last_id: payload.last_id.map(MessageId::new),
            has_next: payload.has_next,
        })
    }
}

// ========================================
// Domain Entity → Payload
// ========================================

/// Build the SEND body for an optimistic message.
pub fn send_payload(message: &Message) -> SendMessagePayload {
    SendMessagePayload {
        room_id: message.room_id.value(),
        sender_id: message.sender_id.as_str().to_string(),
        body: message.body.clone(),
        client_temp_id: message.temp_id().map(|id| id.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(message_id: u64, temp: Option<&str>) -> ChatMessagePayload {
        ChatMessagePayload {
            room_id: 7,
            message_id,
            sender_id: "alice".to_string(),
            body: "hello".to_string(),
            sent_at: 1000,
            client_temp_id: temp.map(str::to_string),
        }
    }

    #[test]
    fn test_payload_to_incoming_message() {
        // テスト項目: 配信ペイロードが確定済み IncomingMessage に変換される
        // given (前提条件):
        let payload = payload(42, Some("tmp-1"));

        // when (操作):
        let incoming = IncomingMessage::try_from(payload).unwrap();

        // then (期待する結果):
        assert_eq!(incoming.message_id, MessageId::new(42));
        assert_eq!(incoming.room_id(), RoomId::new(7));
        assert_eq!(incoming.message.message_id(), Some(MessageId::new(42)));
        assert_eq!(
            incoming.client_temp_id,
            Some(ClientTempId::new("tmp-1".to_string()).unwrap())
        );
        assert_eq!(incoming.message.sent_at, Timestamp::new(1000));
    }

    #[test]
    fn test_empty_temp_id_is_treated_as_absent() {
        // テスト項目: 空文字の clientTempId は未指定として扱われる
        // given (前提条件):
        let payload = payload(1, Some(""));

        // when (操作):
        let incoming = IncomingMessage::try_from(payload).unwrap();

        // then (期待する結果):
        assert_eq!(incoming.client_temp_id, None);
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        // テスト項目: 送信者 ID が空のペイロードは変換エラーになる
        // given (前提条件):
        let mut payload = payload(1, None);
        payload.sender_id = String::new();

        // when (操作):
        let result = IncomingMessage::try_from(payload);

        // then (期待する結果):
        assert_eq!(result, Err(ValueError::EmptySenderId));
    }

    #[test]
    fn test_page_payload_to_domain() {
        // テスト項目: 履歴ページのペイロードがドメインのページに変換される
        // given (前提条件):
        let page = MessagePagePayload {
            items: vec![payload(9, None), payload(10, None)],
            last_id: Some(9),
            has_next: true,
        };

        // when (操作):
        let page = RoomMessagePage::try_from(page).unwrap();

        // then (期待する結果):
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].message_id(), Some(MessageId::new(10)));
        assert_eq!(page.last_id, Some(MessageId::new(9)));
        assert!(page.has_next);
    }

    #[test]
    fn test_pending_message_to_send_payload() {
        // テスト項目: 送信中メッセージから SEND ペイロードが作られる
        // given (前提条件):
        let message = Message::pending(
            RoomId::new(3),
            ClientTempId::new("tmp-9".to_string()).unwrap(),
            SenderId::new("bob".to_string()).unwrap(),
            "yo".to_string(),
            Timestamp::new(5),
        );

        // when (操作):
        let payload = send_payload(&message);

        // then (期待する結果):
        assert_eq!(payload.room_id, 3);
        assert_eq!(payload.sender_id, "bob");
        assert_eq!(payload.body, "yo");
        assert_eq!(payload.client_temp_id.as_deref(), Some("tmp-9"));
    }
}
