//! Noop event bus used when the broker driver is "none".
//!
//! Keeps the dependency graph identical with the broker disabled; only
//! `consume` is an error, because a consumer worker without a broker is a
//! deployment mistake, not a silent no-op.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{BrokerError, EventBus, EventBusConsumer, EventBusMessage, Result};

#[derive(Debug, Default)]
pub struct NoopEventBus;

impl NoopEventBus {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventBus for NoopEventBus {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn publish(&self, _message: EventBusMessage) -> Result<()> {
        Ok(())
    }

    async fn consume(&self, _handler: Arc<dyn EventBusConsumer>) -> Result<()> {
        Err(BrokerError::Disabled)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopHandler;

    #[async_trait]
    impl EventBusConsumer for NoopHandler {
        async fn handle(&self, _message: EventBusMessage) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_noop_is_disabled() {
        let bus = NoopEventBus::new();
        assert!(!bus.is_enabled());
    }

    #[tokio::test]
    async fn test_noop_publish_succeeds() {
        let bus = NoopEventBus::new();
        let message = EventBusMessage {
            event_type: "t".to_string(),
            payload: json!({}),
            headers: Default::default(),
            message_id: None,
        };
        assert!(bus.publish(message).await.is_ok());
    }

    #[tokio::test]
    async fn test_noop_consume_is_an_error() {
        let bus = NoopEventBus::new();
        let result = bus.consume(Arc::new(NoopHandler)).await;
        assert!(matches!(result, Err(BrokerError::Disabled)));
    }
}
