//! Messaging request repository.

use courier_domain::MessagingRequest;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use crate::Result;

fn parse_row(row: &PgRow) -> Result<MessagingRequest> {
    Ok(MessagingRequest {
        id: Some(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        request_file_id: row.try_get("request_file_id")?,
        attachment_file_id: row.try_get("attachment_file_id")?,
        title: row.try_get("title")?,
        default_text: row.try_get("default_text")?,
        sending_time: row.try_get("sending_time")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert(conn: &mut PgConnection, request: &MessagingRequest) -> Result<MessagingRequest> {
    let row = sqlx::query(
        "INSERT INTO messaging_requests \
         (user_id, session_id, request_file_id, attachment_file_id, title, \
          default_text, sending_time, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(request.user_id)
    .bind(request.session_id)
    .bind(request.request_file_id)
    .bind(request.attachment_file_id)
    .bind(&request.title)
    .bind(&request.default_text)
    .bind(request.sending_time)
    .bind(request.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let mut inserted = request.clone();
    inserted.id = Some(row.try_get("id")?);
    Ok(inserted)
}

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<MessagingRequest>> {
    let row = sqlx::query(
        "SELECT id, user_id, session_id, request_file_id, attachment_file_id, title, \
         default_text, sending_time, created_at \
         FROM messaging_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(parse_row).transpose()
}
