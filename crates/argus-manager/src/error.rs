//! Error types for the proxy group manager.

use thiserror::Error;

use argus_store::StoreError;

/// Result type alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur in the proxy group manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot start proxy group manager service: {0}")]
    ServiceInit(String),

    #[error("proxy group manager service unavailable: {0}")]
    Service(String),
}
