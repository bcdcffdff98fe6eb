//! Session repository.

use courier_domain::{MessengerType, Session, SessionAuth};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::{Result, StoreError};

fn parse_row(row: &PgRow) -> Result<Session> {
    let kind_raw: String = row.try_get("messenger_type")?;
    let messenger_type = MessengerType::parse(&kind_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown messenger type: {kind_raw}")))?;

    let session_str: Option<String> = row.try_get("session_str")?;
    let uuid: Option<Uuid> = row.try_get("uuid")?;

    let auth = match messenger_type {
        MessengerType::Telegram => SessionAuth::Account {
            session_str: session_str
                .ok_or_else(|| StoreError::Decode("telegram session without session_str".to_string()))?,
        },
        MessengerType::Whatsapp => SessionAuth::Qr {
            uuid: uuid
                .ok_or_else(|| StoreError::Decode("whatsapp session without uuid".to_string()))?,
        },
    };

    Ok(Session {
        id: Some(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        phone_number: row.try_get("phone_number")?,
        messenger_type,
        auth,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert(conn: &mut PgConnection, session: &Session) -> Result<Session> {
    let row = sqlx::query(
        "INSERT INTO sessions \
         (user_id, title, phone_number, messenger_type, session_str, uuid, is_active, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(session.user_id)
    .bind(&session.title)
    .bind(&session.phone_number)
    .bind(session.messenger_type.as_str())
    .bind(session.auth.session_str())
    .bind(session.auth.uuid())
    .bind(session.is_active)
    .bind(session.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let mut inserted = session.clone();
    inserted.id = Some(row.try_get("id")?);
    Ok(inserted)
}

pub async fn update(conn: &mut PgConnection, session: &Session) -> Result<()> {
    let id = session
        .id
        .ok_or_else(|| StoreError::Decode("session has no id".to_string()))?;

    sqlx::query(
        "UPDATE sessions \
         SET title = $1, session_str = $2, uuid = $3, is_active = $4 \
         WHERE id = $5",
    )
    .bind(&session.title)
    .bind(session.auth.session_str())
    .bind(session.auth.uuid())
    .bind(session.is_active)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(
        "SELECT id, user_id, title, phone_number, messenger_type, session_str, uuid, \
         is_active, created_at \
         FROM sessions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(parse_row).transpose()
}
