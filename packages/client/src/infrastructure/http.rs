//! HTTP collaborators backed by the chat REST API.

use async_trait::async_trait;

use chatline_shared::protocol::{LastReadPayload, MessagePagePayload, UnreadCountPayload};

use crate::domain::{
    CollaboratorError, HistoryClient, LastReadClient, MessageId, RoomId, RoomMessagePage,
    SenderId,
};

/// REST client for room history, last-read and unread counts
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    user_id: SenderId,
}

impl HttpChatApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>, user_id: SenderId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
        }
    }

    fn room_url(&self, room_id: RoomId, path: &str) -> String {
        format!("{}/api/rooms/{}/{}", self.base_url, room_id, path)
    }

    /// Current unread count of the room for this user.
    pub async fn fetch_unread(&self, room_id: RoomId) -> Result<u64, CollaboratorError> {
        let response = self
            .client
            .get(self.room_url(room_id, "unread"))
            .query(&[("userId", self.user_id.as_str())])
            .send()
            .await
            .map_err(request_error)?;
        let payload: UnreadCountPayload = decode(response).await?;
        Ok(payload.count)
    }
}

#[async_trait]
impl HistoryClient for HttpChatApi {
    async fn fetch_page(
        &self,
        room_id: RoomId,
        before_id: Option<MessageId>,
        size: usize,
    ) -> Result<RoomMessagePage, CollaboratorError> {
        let mut query = vec![("size", size.to_string())];
        if let Some(before_id) = before_id {
            query.push(("beforeId", before_id.to_string()));
        }

        let response = self
            .client
            .get(self.room_url(room_id, "messages"))
            .query(&query)
            .send()
            .await
            .map_err(request_error)?;
        let payload: MessagePagePayload = decode(response).await?;

        RoomMessagePage::try_from(payload).map_err(|e| CollaboratorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LastReadClient for HttpChatApi {
    async fn set_last_read(
        &self,
        room_id: RoomId,
        message_id: MessageId,
    ) -> Result<(), CollaboratorError> {
        let body = LastReadPayload {
            user_id: self.user_id.as_str().to_string(),
            message_id: message_id.value(),
        };
        let response = self
            .client
            .put(self.room_url(room_id, "last-read"))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status(status.as_u16()));
        }
        Ok(())
    }
}

fn request_error(error: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Request(error.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, CollaboratorError> {
    let status = response.status();
    if !status.is_success() {
        return Err(CollaboratorError::Status(status.as_u16()));
    }
    response
        .json()
        .await
        .map_err(|e| CollaboratorError::Decode(e.to_string()))
}
