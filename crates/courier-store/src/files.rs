//! File record repository.

use courier_domain::File;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use crate::Result;

fn parse_row(row: &PgRow) -> Result<File> {
    Ok(File {
        id: Some(row.try_get("id")?),
        uri: row.try_get("uri")?,
        name: row.try_get("name")?,
        size: row.try_get("size")?,
        content_type: row.try_get("content_type")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        base64: None,
    })
}

pub async fn insert(conn: &mut PgConnection, file: &File) -> Result<File> {
    let row = sqlx::query(
        "INSERT INTO files (uri, name, size, content_type, user_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(&file.uri)
    .bind(&file.name)
    .bind(file.size)
    .bind(&file.content_type)
    .bind(file.user_id)
    .bind(file.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let mut inserted = file.clone();
    inserted.id = Some(row.try_get("id")?);
    Ok(inserted)
}

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<File>> {
    let row = sqlx::query(
        "SELECT id, uri, name, size, content_type, user_id, created_at \
         FROM files WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(parse_row).transpose()
}
