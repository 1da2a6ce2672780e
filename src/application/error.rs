use thiserror::Error;

use crate::infra::error::InfraError;

/// Top-level error of the binary's bootstrap and command paths. Per-request
/// HTTP error mapping lives in `infra::http::error`, not here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
