//! Publish-side API: enqueue a typed event inside the caller's transaction.

use courier_common::CourierError;
use courier_domain::{EventMeta, OutboxDomainEvent, OutboxEvent};
use courier_store::outbox_events;
use sqlx::postgres::PgConnection;

/// Persist an outbox row for `event`.
///
/// Runs on the caller's connection, so the enqueue commits atomically with
/// the surrounding business write. Transport fields come from `meta`, never
/// from the payload.
pub async fn publish_event<E: OutboxDomainEvent>(
    conn: &mut PgConnection,
    event: &E,
    meta: EventMeta,
) -> Result<OutboxEvent, CourierError> {
    let payload = event
        .payload()
        .map_err(|e| CourierError::permanent(format!("failed to serialize {}: {e}", E::TYPE)))?;

    let mut row = OutboxEvent::new(E::TYPE, payload);
    if let Some(available_at) = meta.available_at {
        row.available_at = available_at;
    }
    row.dedup_key = meta.dedup_key;
    row.aggregate_type = meta.aggregate_type;
    row.aggregate_id = meta.aggregate_id;

    let inserted = outbox_events::insert(conn, &row).await?;
    Ok(inserted)
}
