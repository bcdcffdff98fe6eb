//! Event bus port and adapters.
//!
//! In broker dispatch mode the outbox dispatcher publishes envelopes here and
//! a consumer worker executes handlers on the other side. The noop variant
//! keeps the dependency graph identical when the broker is disabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod noop;
pub mod rabbitmq;

pub use noop::NoopEventBus;
pub use rabbitmq::{RabbitMqEventBus, RabbitMqSettings};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker publish error: {0}")]
    Publish(String),

    #[error("broker consume error: {0}")]
    Consume(String),

    #[error("broker serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event bus is disabled (broker driver 'none')")]
    Disabled,
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Wire envelope carried over the broker; routing key is the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBusMessage {
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Per-delivery callback used by [`EventBus::consume`].
///
/// Returning `Ok` acknowledges the delivery; returning `Err` nacks it back
/// onto the queue.
#[async_trait]
pub trait EventBusConsumer: Send + Sync {
    async fn handle(&self, message: EventBusMessage) -> std::result::Result<(), String>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn publish(&self, message: EventBusMessage) -> Result<()>;

    /// Long-running consume loop; returns when the broker stream ends or the
    /// task is cancelled.
    async fn consume(&self, handler: Arc<dyn EventBusConsumer>) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let mut headers = HashMap::new();
        headers.insert("outbox_id".to_string(), "7".to_string());
        headers.insert("attempts".to_string(), "1".to_string());
        headers.insert("dedup_key".to_string(), "messaging_request:3:send".to_string());

        let message = EventBusMessage {
            event_type: "messaging.request_ready_to_send.v1".to_string(),
            payload: json!({"message_request_id": 3}),
            headers,
            message_id: Some("7".to_string()),
        };

        let body = serde_json::to_vec(&message).unwrap();
        let decoded: EventBusMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_envelope_headers_default_when_absent() {
        let body = r#"{"event_type": "t", "payload": {}}"#;
        let decoded: EventBusMessage = serde_json::from_str(body).unwrap();
        assert!(decoded.headers.is_empty());
        assert!(decoded.message_id.is_none());
    }
}
