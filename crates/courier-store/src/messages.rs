//! Message repository.

use chrono::{DateTime, Utc};
use courier_domain::{Message, MessageStatus};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use crate::{Result, StoreError};

fn parse_row(row: &PgRow) -> Result<Message> {
    let status_raw: String = row.try_get("status")?;
    let status = MessageStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown message status: {status_raw}")))?;

    Ok(Message {
        id: Some(row.try_get("id")?),
        message_request_id: row.try_get("message_request_id")?,
        phone_number: row.try_get("phone_number")?,
        username: row.try_get("username")?,
        user_id: row.try_get("user_id")?,
        text: row.try_get("text")?,
        attachment_file_id: row.try_get("attachment_file_id")?,
        sending_time: row.try_get("sending_time")?,
        sent_time: row.try_get("sent_time")?,
        status,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert(conn: &mut PgConnection, message: &Message) -> Result<Message> {
    let row = sqlx::query(
        "INSERT INTO messages \
         (message_request_id, phone_number, username, user_id, text, \
          attachment_file_id, sending_time, sent_time, status, error_message, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING id",
    )
    .bind(message.message_request_id)
    .bind(&message.phone_number)
    .bind(&message.username)
    .bind(&message.user_id)
    .bind(&message.text)
    .bind(message.attachment_file_id)
    .bind(message.sending_time)
    .bind(message.sent_time)
    .bind(message.status.as_str())
    .bind(&message.error_message)
    .bind(message.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let mut inserted = message.clone();
    inserted.id = Some(row.try_get("id")?);
    Ok(inserted)
}

pub async fn update(conn: &mut PgConnection, message: &Message) -> Result<()> {
    let id = message
        .id
        .ok_or_else(|| StoreError::Decode("message has no id".to_string()))?;

    sqlx::query(
        "UPDATE messages \
         SET status = $1, sent_time = $2, error_message = $3 \
         WHERE id = $4",
    )
    .bind(message.status.as_str())
    .bind(message.sent_time)
    .bind(&message.error_message)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Due pending messages system-wide: `status = PENDING`, `sending_time <=
/// before`, `sent_time IS NULL`, ordered `(sending_time, id)`.
///
/// With `lock = true` the rows are claimed `FOR UPDATE SKIP LOCKED`, so
/// concurrent send handlers partition the due set.
pub async fn get_pending_to_send_before(
    conn: &mut PgConnection,
    before: DateTime<Utc>,
    limit: i64,
    lock: bool,
    skip_locked: bool,
) -> Result<Vec<Message>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let mut query = String::from(
        "SELECT id, message_request_id, phone_number, username, user_id, text, \
         attachment_file_id, sending_time, sent_time, status, error_message, created_at \
         FROM messages \
         WHERE status = 'PENDING' AND sending_time <= $1 AND sent_time IS NULL \
         ORDER BY sending_time ASC, id ASC \
         LIMIT $2",
    );
    if lock {
        query.push_str(" FOR UPDATE");
        if skip_locked {
            query.push_str(" SKIP LOCKED");
        }
    }

    let rows = sqlx::query(&query)
        .bind(before)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in &rows {
        messages.push(parse_row(row)?);
    }
    Ok(messages)
}

/// Probe whether a request still has due pending messages.
pub async fn has_pending_for_request(
    conn: &mut PgConnection,
    request_id: i64,
    before: DateTime<Utc>,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT id FROM messages \
         WHERE message_request_id = $1 AND status = 'PENDING' \
           AND sending_time <= $2 AND sent_time IS NULL \
         LIMIT 1",
    )
    .bind(request_id)
    .bind(before)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}
