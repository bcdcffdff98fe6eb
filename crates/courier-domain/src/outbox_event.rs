use chrono::{DateTime, Utc};
use courier_common::truncate_error;
use serde_json::Value;

/// Upper bound on the persisted `last_error` column.
pub const MAX_LAST_ERROR: usize = 1000;

/// A durably queued domain event.
///
/// Created by business code inside the same transaction as the domain write;
/// mutated only by the dispatcher; never hard-deleted. Once `processed_at` is
/// set the row is terminal (success or dead-letter).
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: Option<i64>,
    pub event_type: String,
    pub payload: Value,

    /// When the dispatcher is allowed to process it.
    pub available_at: DateTime<Utc>,

    /// Set when successfully processed OR dead-lettered.
    pub processed_at: Option<DateTime<Utc>>,

    /// Retry bookkeeping.
    pub attempts: i32,
    pub last_error: Option<String>,

    pub dedup_key: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            event_type: event_type.into(),
            payload,
            available_at: now,
            processed_at: None,
            attempts: 0,
            last_error: None,
            dedup_key: None,
            aggregate_type: None,
            aggregate_id: None,
            created_at: now,
        }
    }

    /// Record a failure message, truncated to the column bound.
    pub fn set_last_error(&mut self, message: &str) {
        self.last_error = Some(truncate_error(message, MAX_LAST_ERROR));
    }

    pub fn is_terminal(&self) -> bool {
        self.processed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_is_immediately_available() {
        let event = OutboxEvent::new("messaging.request_ready_to_send.v1", json!({"x": 1}));
        assert!(event.available_at >= event.created_at);
        assert_eq!(event.attempts, 0);
        assert!(event.processed_at.is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_last_error_is_bounded() {
        let mut event = OutboxEvent::new("t", json!({}));
        event.set_last_error(&"e".repeat(5000));
        assert_eq!(event.last_error.as_ref().unwrap().chars().count(), MAX_LAST_ERROR);
    }
}
