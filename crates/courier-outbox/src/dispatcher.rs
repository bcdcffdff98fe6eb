//! Outbox dispatcher worker.
//!
//! One tick: claim a batch of due events under skip-locked row locks, run
//! each through a handler (direct mode) or publish it to the broker (broker
//! mode), and write retry bookkeeping — all inside one transaction. The
//! dispatcher alone decides retry vs dead-letter, by error kind and
//! `attempts`.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use courier_broker::{EventBus, EventBusMessage};
use courier_store::{outbox_events, UnitOfWork};
use metrics::counter;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::registry::OutboxRegistry;

/// Dispatcher gives up (dead-letters) at this attempt count.
pub const MAX_ATTEMPTS: i32 = 10;

/// How claimed events reach their handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Invoke handlers in-process.
    Direct,
    /// Publish to the broker; consumers invoke handlers.
    Broker,
}

/// `min(60s, 2^(n-1)s)` for attempt `n >= 1`.
pub fn backoff(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 6) as u32;
    Duration::from_secs((1u64 << exponent).min(60))
}

/// Per-tick outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub processed: u64,
    pub rescheduled: u64,
    pub dead_lettered: u64,
}

pub struct OutboxDispatcher {
    pool: PgPool,
    registry: Arc<OutboxRegistry>,
    event_bus: Arc<dyn EventBus>,
    strategy: DispatchStrategy,
}

impl OutboxDispatcher {
    /// Build a dispatcher, enforcing the strategy invariant: broker mode
    /// refuses to start against a disabled bus.
    pub fn new(
        pool: PgPool,
        registry: Arc<OutboxRegistry>,
        event_bus: Arc<dyn EventBus>,
        strategy: DispatchStrategy,
    ) -> Result<Self> {
        if strategy == DispatchStrategy::Broker && !event_bus.is_enabled() {
            anyhow::bail!(
                "dispatch strategy 'broker' requires an enabled broker \
                 (set broker.driver='rabbitmq' and broker.url)"
            );
        }
        Ok(Self {
            pool,
            registry,
            event_bus,
            strategy,
        })
    }

    /// Run one dispatch tick.
    pub async fn run_tick(&self, batch_size: u32) -> Result<TickSummary> {
        let now = Utc::now();
        let mut summary = TickSummary::default();

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let events = outbox_events::get_ready(
            uow.conn().await?,
            now,
            batch_size as i64,
            true,
            true,
        )
        .await?;

        for mut event in events {
            event.attempts += 1;

            let outcome = match self.strategy {
                DispatchStrategy::Direct => {
                    let event_type = event.event_type.clone();
                    let payload = event.payload.clone();
                    let dispatched = self.registry.dispatch(&event_type, &mut uow, &payload).await;
                    match dispatched {
                        Some(result) => result,
                        None => {
                            event.set_last_error(&format!(
                                "No handler registered for event_type={event_type}"
                            ));
                            event.processed_at = Some(now);
                            outbox_events::update(uow.conn().await?, &event).await?;
                            summary.dead_lettered += 1;
                            counter!("courier.outbox.dead_lettered_total").increment(1);
                            warn!(
                                event_type = %event_type,
                                id = ?event.id,
                                "Dead-lettered event with no registered handler"
                            );
                            continue;
                        }
                    }
                }
                DispatchStrategy::Broker => self.publish_to_broker(&event).await,
            };

            match outcome {
                Ok(()) => {
                    event.last_error = None;
                    event.processed_at = Some(now);
                    outbox_events::update(uow.conn().await?, &event).await?;
                    summary.processed += 1;
                    counter!("courier.outbox.processed_total").increment(1);
                }
                Err(e) => {
                    error!(
                        event_type = %event.event_type,
                        id = ?event.id,
                        attempts = event.attempts,
                        error = %e,
                        "Outbox dispatch failed"
                    );
                    event.set_last_error(&e.to_string());

                    if e.is_permanent() || event.attempts >= MAX_ATTEMPTS {
                        event.processed_at = Some(now);
                        outbox_events::update(uow.conn().await?, &event).await?;
                        summary.dead_lettered += 1;
                        counter!("courier.outbox.dead_lettered_total").increment(1);
                    } else {
                        event.available_at =
                            now + ChronoDuration::from_std(backoff(event.attempts))?;
                        outbox_events::update(uow.conn().await?, &event).await?;
                        summary.rescheduled += 1;
                        counter!("courier.outbox.rescheduled_total").increment(1);
                    }
                }
            }
        }

        uow.commit().await?;

        debug!(
            processed = summary.processed,
            rescheduled = summary.rescheduled,
            dead_lettered = summary.dead_lettered,
            "Outbox tick complete"
        );

        Ok(summary)
    }

    async fn publish_to_broker(&self, event: &courier_domain::OutboxEvent) -> courier_common::Result<()> {
        let outbox_id = event
            .id
            .map(|id| id.to_string())
            .unwrap_or_default();

        let mut headers = std::collections::HashMap::new();
        headers.insert("outbox_id".to_string(), outbox_id.clone());
        headers.insert("attempts".to_string(), event.attempts.to_string());
        if let Some(dedup_key) = &event.dedup_key {
            headers.insert("dedup_key".to_string(), dedup_key.clone());
        }
        if let Some(aggregate_type) = &event.aggregate_type {
            headers.insert("aggregate_type".to_string(), aggregate_type.clone());
        }
        if let Some(aggregate_id) = &event.aggregate_id {
            headers.insert("aggregate_id".to_string(), aggregate_id.clone());
        }

        self.event_bus
            .publish(EventBusMessage {
                event_type: event.event_type.clone(),
                payload: event.payload.clone(),
                headers,
                message_id: Some(outbox_id),
            })
            .await
            .map_err(|e| courier_common::CourierError::transient(e.to_string()))
    }

    /// Periodic loop around [`run_tick`]; runs until the task is cancelled.
    pub async fn run(&self, interval: Duration, batch_size: u32) {
        info!(
            interval_ms = %interval.as_millis(),
            batch_size = batch_size,
            strategy = ?self.strategy,
            "Starting outbox dispatcher"
        );

        loop {
            if let Err(e) = self.run_tick(batch_size).await {
                error!(error = %e, "Outbox tick failed");
            }
            sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(4), Duration::from_secs(8));
        assert_eq!(backoff(5), Duration::from_secs(16));
        assert_eq!(backoff(6), Duration::from_secs(32));
        for attempts in 7..=20 {
            assert_eq!(backoff(attempts), Duration::from_secs(60));
        }
    }

    #[test]
    fn test_backoff_handles_degenerate_attempts() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(-5), Duration::from_secs(1));
    }

    #[test]
    fn test_tick_summary_default_is_zero() {
        let summary = TickSummary::default();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.rescheduled, 0);
        assert_eq!(summary.dead_lettered, 0);
    }
}
