//! Error types for the Argus monitoring store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// Whether the operation may succeed if the whole transaction is
    /// retried. Covers the store-unreachable/commit-failed class; data
    /// errors are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(StoreError::Unavailable("connection reset".into()).is_transient());
    }

    #[test]
    fn data_errors_are_not_transient() {
        assert!(!StoreError::Read("bad row".into()).is_transient());
        assert!(!StoreError::Deserialize("truncated".into()).is_transient());
        assert!(!StoreError::Write("constraint".into()).is_transient());
    }
}
