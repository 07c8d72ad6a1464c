//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{RepositoryError, ValueError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UseCaseError {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
