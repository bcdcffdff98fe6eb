//! Outbox event repository.
//!
//! The claim query is the single mutual-exclusion primitive of the core:
//! `FOR UPDATE SKIP LOCKED` partitions the ready set across concurrent
//! dispatcher replicas without a coordinator.

use chrono::{DateTime, Utc};
use courier_domain::OutboxEvent;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::{Result, StoreError};

fn parse_row(row: &PgRow) -> Result<OutboxEvent> {
    Ok(OutboxEvent {
        id: Some(row.try_get("id")?),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        available_at: row.try_get("available_at")?,
        processed_at: row.try_get("processed_at")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        dedup_key: row.try_get("dedup_key")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert an unprocessed event inside the caller's transaction.
pub async fn insert(conn: &mut PgConnection, event: &OutboxEvent) -> Result<OutboxEvent> {
    let row = sqlx::query(
        "INSERT INTO outbox_events \
         (event_type, payload, available_at, processed_at, attempts, last_error, \
          dedup_key, aggregate_type, aggregate_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING id",
    )
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(event.available_at)
    .bind(event.processed_at)
    .bind(event.attempts)
    .bind(&event.last_error)
    .bind(&event.dedup_key)
    .bind(&event.aggregate_type)
    .bind(&event.aggregate_id)
    .bind(event.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let mut inserted = event.clone();
    inserted.id = Some(row.try_get("id")?);

    debug!(
        event_type = %inserted.event_type,
        id = ?inserted.id,
        "Enqueued outbox event"
    );

    Ok(inserted)
}

/// Write the dispatcher-owned bookkeeping columns.
pub async fn update(conn: &mut PgConnection, event: &OutboxEvent) -> Result<()> {
    let id = event
        .id
        .ok_or_else(|| StoreError::Decode("outbox event has no id".to_string()))?;

    sqlx::query(
        "UPDATE outbox_events \
         SET available_at = $1, processed_at = $2, attempts = $3, last_error = $4 \
         WHERE id = $5",
    )
    .bind(event.available_at)
    .bind(event.processed_at)
    .bind(event.attempts)
    .bind(&event.last_error)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<OutboxEvent>> {
    let row = sqlx::query(
        "SELECT id, event_type, payload, available_at, processed_at, attempts, \
         last_error, dedup_key, aggregate_type, aggregate_id, created_at \
         FROM outbox_events WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(parse_row).transpose()
}

/// Claim due events: `processed_at IS NULL AND available_at <= now`, ordered
/// `(available_at, id)`, capped at `limit`.
///
/// With `lock = true` the rows are selected `FOR UPDATE`; `skip_locked`
/// additionally skips rows already claimed by another replica.
pub async fn get_ready(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    limit: i64,
    lock: bool,
    skip_locked: bool,
) -> Result<Vec<OutboxEvent>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let mut query = String::from(
        "SELECT id, event_type, payload, available_at, processed_at, attempts, \
         last_error, dedup_key, aggregate_type, aggregate_id, created_at \
         FROM outbox_events \
         WHERE processed_at IS NULL AND available_at <= $1 \
         ORDER BY available_at ASC, id ASC \
         LIMIT $2",
    );
    if lock {
        query.push_str(" FOR UPDATE");
        if skip_locked {
            query.push_str(" SKIP LOCKED");
        }
    }

    let rows = sqlx::query(&query)
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in &rows {
        events.push(parse_row(row)?);
    }

    debug!(count = events.len(), locked = lock, "Claimed ready outbox events");

    Ok(events)
}
