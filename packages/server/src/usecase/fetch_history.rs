//! UseCase: 履歴ページ取得

use std::sync::Arc;

use crate::domain::{MessagePage, RoomRepository};

pub const DEFAULT_PAGE_SIZE: usize = 30;
pub const MAX_PAGE_SIZE: usize = 100;

/// 履歴ページ取得のユースケース
pub struct FetchHistoryUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl FetchHistoryUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// `before_id` より古いメッセージを最大 `size` 件、古い順で返す
    ///
    /// `size` が省略された場合は既定値、上限を超える場合は上限に丸める。
    pub async fn execute(
        &self,
        room_id: u64,
        before_id: Option<u64>,
        size: Option<usize>,
    ) -> MessagePage {
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        self.repository.fetch_page(room_id, before_id, size).await
    }
}
