pub mod logging;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Cross-crate error carried from handlers back to the outbox dispatcher.
///
/// The dispatcher is the only component that decides retry vs dead-letter:
/// handlers never swallow failures, they classify them and propagate.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Client-visible bad input. Never retried.
    #[error("{0}")]
    Validation(String),

    /// A referenced aggregate is absent. Retried with backoff, then
    /// dead-lettered.
    #[error("{0}")]
    NotFound(String),

    /// Infrastructure or upstream failure that may heal. Retried with
    /// backoff.
    #[error("{0}")]
    Transient(String),

    /// Unrecoverable failure (unknown event type, malformed payload).
    /// Dead-lettered on first encounter, no retry budget.
    #[error("{0}")]
    Permanent(String),
}

impl CourierError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Whether the dispatcher should dead-letter without consuming the
    /// retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_) | Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;

// ============================================================================
// String Helpers
// ============================================================================

/// Truncate an error message to at most `max` characters, respecting char
/// boundaries. Used for the bounded `last_error` / `error_message` columns.
pub fn truncate_error(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    message.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_short_message_unchanged() {
        assert_eq!(truncate_error("boom", 1000), "boom");
    }

    #[test]
    fn test_truncate_error_caps_length() {
        let long = "x".repeat(2000);
        let truncated = truncate_error(&long, 1000);
        assert_eq!(truncated.chars().count(), 1000);
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let message = "é".repeat(10);
        let truncated = truncate_error(&message, 5);
        assert_eq!(truncated.chars().count(), 5);
    }

    #[test]
    fn test_permanent_classification() {
        assert!(CourierError::permanent("bad payload").is_permanent());
        assert!(CourierError::validation("bad input").is_permanent());
        assert!(!CourierError::transient("timeout").is_permanent());
        assert!(!CourierError::not_found("session 3").is_permanent());
    }
}
