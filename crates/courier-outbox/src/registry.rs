//! Event-type to handler mapping.
//!
//! Built once by the composition root at startup, read-only afterwards.
//! Handlers are registered against their typed event; payload decoding
//! happens in an erased wrapper so the dispatcher works on raw rows. A
//! payload that does not decode is a permanent failure (dead-letter), not a
//! retry.

use async_trait::async_trait;
use courier_common::CourierError;
use courier_domain::OutboxDomainEvent;
use courier_store::UnitOfWork;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed outbox event handler.
///
/// Collaborators (registries, stores, clients) are injected at construction,
/// so each handler carries exactly what it needs.
#[async_trait]
pub trait OutboxHandler<E>: Send + Sync {
    async fn handle(&self, uow: &mut UnitOfWork, event: E) -> courier_common::Result<()>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(&self, uow: &mut UnitOfWork, payload: &Value) -> courier_common::Result<()>;
}

struct TypedHandler<E, H> {
    handler: H,
    _event: PhantomData<fn() -> E>,
}

pub(crate) fn decode_event<E: OutboxDomainEvent>(payload: &Value) -> Result<E, CourierError> {
    E::from_payload(payload)
        .map_err(|e| CourierError::permanent(format!("Malformed payload for event_type={}: {e}", E::TYPE)))
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: OutboxDomainEvent + Send + Sync + 'static,
    H: OutboxHandler<E> + 'static,
{
    async fn handle(&self, uow: &mut UnitOfWork, payload: &Value) -> courier_common::Result<()> {
        let event = decode_event::<E>(payload)?;
        self.handler.handle(uow, event).await
    }
}

#[derive(Default)]
pub struct OutboxRegistry {
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
}

impl OutboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `E::TYPE`. Last registration wins.
    pub fn register<E, H>(&mut self, handler: H)
    where
        E: OutboxDomainEvent + Send + Sync + 'static,
        H: OutboxHandler<E> + 'static,
    {
        self.handlers.insert(
            E::TYPE,
            Arc::new(TypedHandler {
                handler,
                _event: PhantomData,
            }),
        );
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Decode and run the handler for `event_type`.
    ///
    /// `None` means no handler is registered — the caller decides whether
    /// that is a dead-letter (dispatcher) or a drop (consumer).
    pub async fn dispatch(
        &self,
        event_type: &str,
        uow: &mut UnitOfWork,
        payload: &Value,
    ) -> Option<courier_common::Result<()>> {
        let handler = self.handlers.get(event_type)?.clone();
        Some(handler.handle(uow, payload).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct PingV1 {
        target: String,
    }

    impl OutboxDomainEvent for PingV1 {
        const TYPE: &'static str = "test.ping.v1";
    }

    struct PingHandler;

    #[async_trait]
    impl OutboxHandler<PingV1> for PingHandler {
        async fn handle(&self, _uow: &mut UnitOfWork, _event: PingV1) -> courier_common::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_contains() {
        let mut registry = OutboxRegistry::new();
        assert!(!registry.contains(PingV1::TYPE));
        registry.register::<PingV1, _>(PingHandler);
        assert!(registry.contains("test.ping.v1"));
        assert!(!registry.contains("legacy.foo.v1"));
    }

    #[test]
    fn test_decode_rejects_malformed_payload_permanently() {
        let err = decode_event::<PingV1>(&json!({"target": 3})).unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("test.ping.v1"));
    }

    #[test]
    fn test_decode_round_trips() {
        let event = decode_event::<PingV1>(&json!({"target": "alice"})).unwrap();
        assert_eq!(event.target, "alice");
    }
}
