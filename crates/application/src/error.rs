use std::time::Duration;

use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    /// 持久化调用超过了调度器允许的时长
    #[error("persistence gateway did not answer within {0:?}")]
    GatewayTimeout(Duration),
    #[error("hub is no longer running")]
    HubClosed,
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
