//! JSON payloads carried in frame bodies and by the HTTP API.

use serde::{Deserialize, Serialize};

/// A server-confirmed chat message (MESSAGE body, history page item)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub room_id: u64,
    pub message_id: u64,
    pub sender_id: String,
    pub body: String,
    pub sent_at: i64,
    /// Echoed back only to confirm the sender's optimistic message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

/// SEND body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_id: u64,
    pub sender_id: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

/// One page of room history, items in ascending id order.
///
/// `last_id` is the cursor to pass as `beforeId` for the next, older page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePagePayload {
    pub items: Vec<ChatMessagePayload>,
    pub last_id: Option<u64>,
    pub has_next: bool,
}

/// `PUT /api/rooms/{id}/last-read` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastReadPayload {
    pub user_id: String,
    pub message_id: u64,
}

/// `GET /api/rooms/{id}/unread` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountPayload {
    pub room_id: u64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_uses_camel_case_and_omits_missing_temp_id() {
        // テスト項目: JSON は camelCase で、clientTempId が無い場合は出力されない
        // given (前提条件):
        let payload = ChatMessagePayload {
            room_id: 1,
            message_id: 42,
            sender_id: "alice".to_string(),
            body: "hi".to_string(),
            sent_at: 1000,
            client_temp_id: None,
        };

        // when (操作):
        let json = serde_json::to_value(&payload).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            serde_json::json!({
                "roomId": 1,
                "messageId": 42,
                "senderId": "alice",
                "body": "hi",
                "sentAt": 1000
            })
        );
    }

    #[test]
    fn test_chat_message_accepts_temp_id() {
        // テスト項目: clientTempId 付きのエコーが読み取れる
        // given (前提条件):
        let json = r#"{"roomId":1,"messageId":42,"senderId":"alice","body":"hi","sentAt":1000,"clientTempId":"tmp-1"}"#;

        // when (操作):
        let payload: ChatMessagePayload = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(payload.client_temp_id.as_deref(), Some("tmp-1"));
    }
}
