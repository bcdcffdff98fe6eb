//! Broker-side consumer worker.
//!
//! Subscribes through the event bus and routes deliveries through the same
//! handler registry the direct dispatcher uses. Unknown event types are
//! logged and dropped (acked); handler failures bubble back into the broker
//! adapter, which nacks and requeues the delivery.

use anyhow::Result;
use async_trait::async_trait;
use courier_broker::{EventBus, EventBusConsumer, EventBusMessage};
use courier_store::UnitOfWork;
use metrics::counter;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::registry::OutboxRegistry;

pub struct BrokerConsumer {
    pool: PgPool,
    registry: Arc<OutboxRegistry>,
}

impl BrokerConsumer {
    pub fn new(pool: PgPool, registry: Arc<OutboxRegistry>) -> Self {
        Self { pool, registry }
    }
}

#[async_trait]
impl EventBusConsumer for BrokerConsumer {
    async fn handle(&self, message: EventBusMessage) -> std::result::Result<(), String> {
        if !self.registry.contains(&message.event_type) {
            // Not for this service; ack by returning.
            info!(event_type = %message.event_type, "No handler for event type (dropping)");
            counter!("courier.consumer.dropped_total").increment(1);
            return Ok(());
        }

        let mut uow = UnitOfWork::begin(&self.pool)
            .await
            .map_err(|e| e.to_string())?;

        let outcome = self
            .registry
            .dispatch(&message.event_type, &mut uow, &message.payload)
            .await;

        match outcome {
            Some(Ok(())) => {
                uow.commit().await.map_err(|e| e.to_string())?;
                counter!("courier.consumer.processed_total").increment(1);
                Ok(())
            }
            Some(Err(e)) => {
                let _ = uow.rollback().await;
                counter!("courier.consumer.failed_total").increment(1);
                Err(e.to_string())
            }
            None => Ok(()),
        }
    }
}

/// Long-running consume loop; tears down the bus on exit.
pub async fn run_consumer(
    event_bus: Arc<dyn EventBus>,
    consumer: Arc<BrokerConsumer>,
) -> Result<()> {
    if !event_bus.is_enabled() {
        anyhow::bail!("consume_broker_events requires broker.driver != 'none'");
    }

    let result = event_bus.consume(consumer).await;
    event_bus.close().await?;
    result?;
    Ok(())
}
