//! UseCase 層
//!
//! フレームセッションと HTTP ハンドラーから呼ばれるアプリケーションロジック。

pub mod error;
pub mod fetch_history;
pub mod read_state;
pub mod send_message;

pub use error::UseCaseError;
pub use fetch_history::FetchHistoryUseCase;
pub use read_state::ReadStateUseCase;
pub use send_message::SendMessageUseCase;
