//! Idempotent schema bootstrap.
//!
//! Creates the core tables and indexes if they do not exist. Statements run
//! one at a time so the whole bootstrap works over the prepared-statement
//! protocol.

use sqlx::PgPool;
use tracing::info;

use crate::Result;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS outbox_events (
        id BIGSERIAL PRIMARY KEY,
        event_type VARCHAR(200) NOT NULL,
        payload JSONB NOT NULL,
        available_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        processed_at TIMESTAMPTZ,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        dedup_key VARCHAR(255),
        aggregate_type VARCHAR(50),
        aggregate_id VARCHAR(128),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_event_type ON outbox_events (event_type)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_available_at ON outbox_events (available_at)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_processed_at ON outbox_events (processed_at)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_dedup_key ON outbox_events (dedup_key)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_aggregate_type ON outbox_events (aggregate_type)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_aggregate_id ON outbox_events (aggregate_id)",
    "CREATE INDEX IF NOT EXISTS ix_outbox_events_created_at ON outbox_events (created_at)",
    "CREATE TABLE IF NOT EXISTS sessions (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        title VARCHAR(200) NOT NULL,
        phone_number VARCHAR(32) NOT NULL,
        messenger_type VARCHAR(20) NOT NULL,
        session_str TEXT,
        uuid UUID,
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS ix_sessions_user_id ON sessions (user_id)",
    "CREATE TABLE IF NOT EXISTS files (
        id BIGSERIAL PRIMARY KEY,
        uri TEXT NOT NULL,
        name VARCHAR(255) NOT NULL,
        size BIGINT,
        content_type VARCHAR(100),
        user_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS messaging_requests (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        session_id BIGINT NOT NULL REFERENCES sessions (id),
        request_file_id BIGINT REFERENCES files (id),
        attachment_file_id BIGINT REFERENCES files (id),
        title VARCHAR(200),
        default_text TEXT,
        sending_time TIMESTAMPTZ NOT NULL DEFAULT now(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS ix_messaging_requests_user_id ON messaging_requests (user_id)",
    "CREATE TABLE IF NOT EXISTS messages (
        id BIGSERIAL PRIMARY KEY,
        message_request_id BIGINT NOT NULL REFERENCES messaging_requests (id),
        phone_number VARCHAR(32),
        username VARCHAR(128),
        user_id VARCHAR(128),
        text TEXT NOT NULL,
        attachment_file_id BIGINT REFERENCES files (id),
        sending_time TIMESTAMPTZ NOT NULL DEFAULT now(),
        sent_time TIMESTAMPTZ,
        status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS ix_messages_request_id ON messages (message_request_id)",
    "CREATE INDEX IF NOT EXISTS ix_messages_status_sending_time ON messages (status, sending_time)",
];

/// Create tables and indexes if they do not exist.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Initialized PostgreSQL schema");
    Ok(())
}
