/*
[INPUT]:  Error sources (transport, venue rejections, rate limits, timeouts)
[OUTPUT]: Structured error type with retry hints
[POS]:    Error handling layer - unified error type for adapter operations
[UPDATE]: When adding new error sources or retry semantics
*/

use thiserror::Error;

/// Error type shared by every adapter operation.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Network-level failure; the outcome of the request is unknown.
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue answered with a permanent rejection.
    #[error("venue rejected request (code {code}): {message}")]
    Reject { code: i32, message: String },

    /// Rate limit exceeded; `retry_after_ms` comes from Retry-After when the
    /// venue sends one.
    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Request timed out; the outcome is unknown.
    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The referenced order does not exist on the venue.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The canonical symbol has no mapping on this venue.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The adapter does not implement an optional capability.
    #[error("operation not supported by {adapter}: {operation}")]
    NotSupported {
        adapter: String,
        operation: &'static str,
    },

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The adapter is not connected.
    #[error("adapter disconnected")]
    Disconnected,
}

impl AdapterError {
    /// Transient errors leave the request outcome unknown and are worth
    /// retrying on a later pass. Everything else is a permanent answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transport(_)
                | AdapterError::RateLimited { .. }
                | AdapterError::Timeout { .. }
                | AdapterError::Disconnected
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AdapterError::RateLimited { .. })
    }

    /// Venue-provided retry delay, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            AdapterError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(std::time::Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn error_retryable_classification() {
        assert!(AdapterError::Transport("reset".to_string()).is_retryable());
        assert!(AdapterError::Timeout { duration_ms: 5000 }.is_retryable());
        assert!(AdapterError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(AdapterError::Disconnected.is_retryable());

        assert!(
            !AdapterError::Reject {
                code: 400,
                message: "bad price".to_string()
            }
            .is_retryable()
        );
        assert!(!AdapterError::OrderNotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn error_retry_after_only_from_rate_limit() {
        let limited = AdapterError::RateLimited {
            retry_after_ms: Some(1500),
        };
        assert!(limited.is_rate_limit());
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(1500)));

        assert_eq!(
            AdapterError::RateLimited {
                retry_after_ms: None
            }
            .retry_after(),
            None
        );
        assert_eq!(AdapterError::Timeout { duration_ms: 1 }.retry_after(), None);
    }
}
