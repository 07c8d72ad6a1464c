//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 入力の検証、ルームログへの追加、購読者への配信
//!
//! ### どのような状況を想定しているか
//! - 正常系：ID が採番され、clientTempId 付きで配信される
//! - 異常系：空の本文は保存も配信もされない

use std::sync::Arc;

use chatline_shared::time::Clock;

use crate::domain::{ChatMessage, MessageBody, MessagePublisher, RoomRepository, UserId};

use super::error::UseCaseError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    /// Repository（ルームログの保存先）
    repository: Arc<dyn RoomRepository>,
    /// MessagePublisher（購読者への配信）
    publisher: Arc<dyn MessagePublisher>,
    clock: Arc<dyn Clock>,
}

impl SendMessageUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        publisher: Arc<dyn MessagePublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            publisher,
            clock,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `room_id` - 送信先ルーム
    /// * `sender_id` - 送信者（セッションの認証済みユーザー）
    /// * `body` - 本文
    /// * `client_temp_id` - 送信者が付けた一時 ID（配信時にそのまま返す）
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - ID が採番されたメッセージ
    /// * `Err(UseCaseError)` - 本文が不正
    pub async fn execute(
        &self,
        room_id: u64,
        sender_id: UserId,
        body: String,
        client_temp_id: Option<String>,
    ) -> Result<ChatMessage, UseCaseError> {
        let body = MessageBody::new(body)?;

        // 1. ルームログに追加して ID を採番
        let message = self
            .repository
            .append_message(room_id, sender_id, body, self.clock.now_millis())
            .await;

        // 2. 購読者へ配信
        let delivered = self.publisher.publish(&message, client_temp_id).await;
        tracing::info!(
            "Message {} from '{}' stored in room {} and delivered to {} subscribers",
            message.message_id,
            message.sender_id,
            room_id,
            delivered
        );

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use chatline_shared::time::FixedClock;

    use super::*;
    use crate::{
        domain::{MockMessagePublisher, MockRoomRepository, ValueError},
        infrastructure::repository::InMemoryRoomRepository,
    };

    fn alice() -> UserId {
        UserId::new("alice".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_assigns_id_and_echoes_temp_id() {
        // テスト項目: メッセージに ID が採番され、clientTempId 付きで配信される
        // given (前提条件):
        let repository = Arc::new(InMemoryRoomRepository::new());
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .withf(|message, temp_id| {
                message.message_id == 1 && temp_id.as_deref() == Some("tmp-1")
            })
            .times(1)
            .returning(|_, _| 2);
        let usecase = SendMessageUseCase::new(
            repository.clone(),
            Arc::new(publisher),
            Arc::new(FixedClock::new(1672498800000)),
        );

        // when (操作):
        let result = usecase
            .execute(3, alice(), "Hello!".to_string(), Some("tmp-1".to_string()))
            .await;

        // then (期待する結果):
        let message = result.unwrap();
        assert_eq!(message.room_id, 3);
        assert_eq!(message.message_id, 1);
        assert_eq!(message.sent_at, 1672498800000);
        assert_eq!(repository.fetch_page(3, None, 10).await.items, vec![message]);
    }

    #[tokio::test]
    async fn test_blank_body_is_rejected_before_storing() {
        // テスト項目: 空白のみの本文は保存も配信もされずにエラーになる
        // given (前提条件):
        let mut repository = MockRoomRepository::new();
        repository.expect_append_message().never();
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();
        let usecase = SendMessageUseCase::new(
            Arc::new(repository),
            Arc::new(publisher),
            Arc::new(FixedClock::new(0)),
        );

        // when (操作):
        let result = usecase.execute(3, alice(), "   ".to_string(), None).await;

        // then (期待する結果):
        assert_eq!(result, Err(UseCaseError::Value(ValueError::EmptyBody)));
    }
}
