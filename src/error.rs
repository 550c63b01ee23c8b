use std::time::Duration;
use thiserror::Error;

/// A single source's page fetch failed (transport, HTTP status or parse).
#[derive(Debug, Clone, Error)]
#[error("source {source_id}: {message}")]
pub struct AdapterError {
    pub source_id: String,
    pub message: String,
}

impl AdapterError {
    pub fn new(source_id: &str, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }
}

/// The breaker is open and refused to invoke the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit open, next probe in {retry_in:?}")]
pub struct CircuitOpenError {
    pub retry_in: Duration,
}

/// Outcome of a call routed through the circuit breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(CircuitOpenError),
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }
}

/// A media element failed to load or decode.
#[derive(Debug, Clone, Error)]
#[error("item {item_id}: {reason}")]
pub struct PlaybackError {
    pub item_id: String,
    pub reason: String,
}

impl PlaybackError {
    pub fn new(item_id: &str, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// An engagement or bookmark write was rejected or never reached the server.
#[derive(Debug, Clone, Error)]
#[error("{action} on item {item_id} failed: {message}")]
pub struct MutationError {
    pub item_id: String,
    pub action: String,
    pub message: String,
}

impl MutationError {
    pub fn new(item_id: &str, action: &str, message: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            action: action.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_names_source() {
        let e = AdapterError::new("ig-main", "HTTP 502");
        assert_eq!(e.to_string(), "source ig-main: HTTP 502");
    }

    #[test]
    fn test_breaker_error_is_transparent() {
        let e: BreakerError<AdapterError> = BreakerError::Inner(AdapterError::new("a", "boom"));
        assert!(!e.is_open());
        assert_eq!(e.to_string(), "source a: boom");

        let open: BreakerError<AdapterError> = BreakerError::Open(CircuitOpenError {
            retry_in: Duration::from_secs(3),
        });
        assert!(open.is_open());
        assert!(open.to_string().starts_with("circuit open"));
    }

    #[test]
    fn test_mutation_error_display() {
        let e = MutationError::new("r1", "like", "HTTP 500");
        assert_eq!(e.to_string(), "like on item r1 failed: HTTP 500");
    }
}
