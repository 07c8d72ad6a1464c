//! UseCase: 既読位置と未読数

use std::sync::Arc;

use crate::domain::{RoomRepository, UserId};

use super::error::UseCaseError;

/// 既読位置の更新と未読数取得のユースケース
pub struct ReadStateUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl ReadStateUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// 既読位置を更新し、更新後の位置を返す（後退はしない）
    pub async fn mark_read(
        &self,
        room_id: u64,
        user_id: String,
        message_id: u64,
    ) -> Result<u64, UseCaseError> {
        let user_id = UserId::new(user_id)?;
        let marker = self
            .repository
            .set_last_read(room_id, user_id.clone(), message_id)
            .await?;
        tracing::debug!("'{}' read room {} up to {}", user_id, room_id, marker);
        Ok(marker)
    }

    pub async fn unread_count(&self, room_id: u64, user_id: String) -> Result<u64, UseCaseError> {
        let user_id = UserId::new(user_id)?;
        Ok(self.repository.unread_count(room_id, &user_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageBody, RepositoryError, ValueError},
        infrastructure::repository::InMemoryRoomRepository,
    };

    async fn seeded_repository() -> Arc<InMemoryRoomRepository> {
        let repository = Arc::new(InMemoryRoomRepository::new());
        for text in ["one", "two", "three"] {
            repository
                .append_message(
                    4,
                    UserId::new("alice".to_string()).unwrap(),
                    MessageBody::new(text.to_string()).unwrap(),
                    0,
                )
                .await;
        }
        repository
    }

    #[tokio::test]
    async fn test_mark_read_reduces_unread_count() {
        // テスト項目: 既読位置を進めると未読数が減る
        // given (前提条件):
        let usecase = ReadStateUseCase::new(seeded_repository().await);

        // when (操作):
        let before = usecase.unread_count(4, "bob".to_string()).await;
        let marker = usecase.mark_read(4, "bob".to_string(), 2).await;
        let after = usecase.unread_count(4, "bob".to_string()).await;

        // then (期待する結果):
        assert_eq!(before, Ok(3));
        assert_eq!(marker, Ok(2));
        assert_eq!(after, Ok(1));
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        // テスト項目: 不正なユーザー ID や存在しないメッセージ ID はエラーになる
        // given (前提条件):
        let usecase = ReadStateUseCase::new(seeded_repository().await);

        // when (操作):
        let empty_user = usecase.mark_read(4, "".to_string(), 1).await;
        let unknown = usecase.mark_read(4, "bob".to_string(), 9).await;

        // then (期待する結果):
        assert_eq!(
            empty_user,
            Err(UseCaseError::Value(ValueError::EmptyUserId))
        );
        assert_eq!(
            unknown,
            Err(UseCaseError::Repository(RepositoryError::MessageNotFound {
                room_id: 4,
                message_id: 9
            }))
        );
    }
}
