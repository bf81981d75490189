use thiserror::Error;

/// Errors related to key parsing and validation.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed key: {0}")]
    MalformedKey(String),
    #[error("invalid alias: {0}")]
    InvalidAlias(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("shard routing failed: {0}")]
    Routing(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Whether the failure is an infrastructure hiccup worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    #[error("identifier authority unavailable: {0}")]
    AuthorityUnavailable(String),
    #[error("identifier space exhausted: {0}")]
    Exhausted(String),
    #[error("invalid node id {node_id}; expected 0..={max_node_id}")]
    InvalidNodeId { node_id: u16, max_node_id: u16 },
    #[error("epoch is ahead of current clock time: epoch={epoch}, now={now}")]
    EpochAhead {
        epoch: jiff::Timestamp,
        now: jiff::Timestamp,
    },
    #[error("overtime limit")]
    OverTimeLimit,
}

/// Errors surfaced by the shortener to its callers.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid alias: {0}")]
    InvalidAlias(String),
    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),
    #[error("malformed key: {0}")]
    MalformedKey(String),
    #[error("alias already taken: {0}")]
    AliasTaken(String),
    #[error("allocator issued a duplicate identifier {id} (key {key})")]
    AllocatorInvariantViolated { key: String, id: u64 },
    #[error("identifier allocation failed: {0}")]
    Allocator(#[from] AllocatorError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("write outcome unknown after timeout: {0}")]
    Timeout(String),
}

impl ShortenerError {
    /// Caller mistakes. These are reported as-is and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ShortenerError::InvalidUrl(_)
                | ShortenerError::InvalidAlias(_)
                | ShortenerError::InvalidExpiration(_)
                | ShortenerError::MalformedKey(_)
                | ShortenerError::AliasTaken(_)
        )
    }

    /// Infrastructure faults the caller may retry as a whole request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShortenerError::Timeout(_) => true,
            ShortenerError::Storage(e) => e.is_transient(),
            ShortenerError::Allocator(AllocatorError::AuthorityUnavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::MalformedKey(message) => Self::MalformedKey(message),
            CoreError::InvalidAlias(message) => Self::InvalidAlias(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_client_errors() {
        assert!(ShortenerError::AliasTaken("promo".into()).is_client_error());
        assert!(ShortenerError::MalformedKey("!!".into()).is_client_error());
        assert!(!ShortenerError::Timeout("abc".into()).is_client_error());
    }

    #[test]
    fn invariant_violation_is_neither_client_nor_retryable() {
        let err = ShortenerError::AllocatorInvariantViolated {
            key: "abc".into(),
            id: 42,
        };
        assert!(!err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_storage_errors_are_retryable() {
        let err: ShortenerError = StorageError::Unavailable("down".into()).into();
        assert!(err.is_retryable());

        let err: ShortenerError = StorageError::InvalidData("bad row".into()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn core_errors_convert() {
        let err: ShortenerError = CoreError::InvalidAlias("x".into()).into();
        assert!(matches!(err, ShortenerError::InvalidAlias(_)));
    }
}
