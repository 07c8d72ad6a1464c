//! Shared application state.

use std::{collections::HashSet, sync::Arc};

use chatline_shared::protocol::HeartBeat;

use crate::{
    infrastructure::RoomBroker,
    usecase::{FetchHistoryUseCase, ReadStateUseCase, SendMessageUseCase},
};

pub struct AppState {
    /// SendMessageUseCase（メッセージ送信のユースケース）
    pub send_message_usecase: Arc<SendMessageUseCase>,
    /// FetchHistoryUseCase（履歴ページ取得のユースケース）
    pub fetch_history_usecase: Arc<FetchHistoryUseCase>,
    /// ReadStateUseCase（既読位置・未読数のユースケース）
    pub read_state_usecase: Arc<ReadStateUseCase>,
    /// Subscription registry shared by every frame session
    pub broker: Arc<RoomBroker>,
    /// Rooms whose SUBSCRIBE is answered with ERROR
    pub restricted_rooms: HashSet<u64>,
    /// Heart-beat offered in CONNECTED
    pub heart_beat: HeartBeat,
}
