//! Webhook error types.

use thiserror::Error;

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors surfaced by registry, retry and query operations.
///
/// Delivery failures (transport errors, non-2xx responses) are not errors:
/// they are recorded as failed [`DeliveryAttempt`](crate::DeliveryAttempt)s.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Malformed registration or update input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced endpoint or delivery attempt does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of the missing record.
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A stored payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl WebhookError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn endpoint_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "WebhookEndpoint",
            id: id.into(),
        }
    }

    pub fn delivery_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "DeliveryAttempt",
            id: id.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WebhookError::endpoint_not_found("abc");
        assert_eq!(err.to_string(), "WebhookEndpoint not found: abc");

        let err = WebhookError::delivery_not_found("d1");
        assert_eq!(err.to_string(), "DeliveryAttempt not found: d1");

        let err = WebhookError::validation("url is required");
        assert_eq!(err.to_string(), "Validation error: url is required");
    }

    #[test]
    fn test_error_predicates() {
        assert!(WebhookError::endpoint_not_found("x").is_not_found());
        assert!(!WebhookError::endpoint_not_found("x").is_validation());
        assert!(WebhookError::validation("bad").is_validation());
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WebhookError = parse_err.into();
        assert!(matches!(err, WebhookError::Serialization(_)));
    }
}
